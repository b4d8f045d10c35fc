//! Scrapes video comments with headless Chrome, translates them and
//! classifies their sentiment with a remote LLM.

pub mod analyzer;
pub mod api;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod extractor;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod stealth;
pub mod translator;

pub use config::{PipelineConfig, RunRequest};
pub use error::{PipelineError, PipelineResult};
pub use models::{PipelineReport, Sentiment, SentimentCounts, SentimentResult, TranslationRecord};
pub use pipeline::Pipeline;
