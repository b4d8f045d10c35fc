//! Pipeline configuration.
//!
//! All tunables live in [`PipelineConfig`], which is passed explicitly into the
//! pipeline. `from_env` reads `.env`/environment overrides on top of defaults.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// CSS selector of comment text nodes
    pub content_selector: String,
    /// Wait after navigation before touching the page
    pub settle_time: Duration,
    /// First nudge that makes the comment section start loading
    pub initial_scroll_offset: u32,
    pub initial_scroll_pause: Duration,
    pub scroll_pause: Duration,
    pub max_scroll_rounds: u32,
    pub scroll_timeout: Duration,
    pub window_size: (u32, u32),
    pub locale: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            content_selector: "#content-text".to_string(),
            settle_time: Duration::from_secs(5),
            initial_scroll_offset: 800,
            initial_scroll_pause: Duration::from_secs(3),
            scroll_pause: Duration::from_secs(2),
            max_scroll_rounds: 200,
            scroll_timeout: Duration::from_secs(600),
            window_size: (1920, 1080),
            locale: "en-US".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub endpoint: String,
    pub source_lang: String,
    pub target_lang: String,
    pub timeout: Duration,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://translate.googleapis.com/translate_a/single".to_string(),
            source_lang: "auto".to_string(),
            target_lang: "en".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://integrate.api.nvidia.com/v1".to_string(),
            api_key: String::new(),
            model: "meta/llama-3.1-8b-instruct".to_string(),
            temperature: 0.1,
            top_p: 0.7,
            max_tokens: 512,
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub extraction: ExtractionConfig,
    pub translation: TranslationConfig,
    pub completion: CompletionConfig,
    /// Max in-flight remote calls per stage. 1 keeps the calls strictly sequential.
    pub concurrency: usize,
    /// Root under which each run gets its own artifact directory
    pub artifact_dir: PathBuf,
    /// Whole pipeline runs (each with its own Chrome) allowed at once by the API
    pub max_concurrent_runs: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extraction: ExtractionConfig::default(),
            translation: TranslationConfig::default(),
            completion: CompletionConfig::default(),
            concurrency: 4,
            artifact_dir: env::temp_dir().join("comment-sentiment"),
            max_concurrent_runs: 1,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by environment variables (`.env` is honoured).
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let mut config = Self::default();

        if let Ok(key) = env::var("NVIDIA_API_KEY") {
            config.completion.api_key = key;
        }
        if let Ok(url) = env::var("LLM_BASE_URL") {
            config.completion.base_url = url;
        }
        if let Ok(model) = env::var("LLM_MODEL") {
            config.completion.model = model;
        }
        if let Ok(url) = env::var("TRANSLATE_URL") {
            config.translation.endpoint = url;
        }
        if let Ok(lang) = env::var("TARGET_LANG") {
            config.translation.target_lang = lang;
        }
        if let Ok(dir) = env::var("ARTIFACT_DIR") {
            config.artifact_dir = PathBuf::from(dir);
        }

        config.concurrency = env_or("PIPELINE_CONCURRENCY", config.concurrency).max(1);
        config.max_concurrent_runs =
            env_or("MAX_CONCURRENT_RUNS", config.max_concurrent_runs).max(1);
        config.extraction.max_scroll_rounds =
            env_or("MAX_SCROLL_ROUNDS", config.extraction.max_scroll_rounds);
        config.extraction.scroll_timeout = Duration::from_secs(env_or(
            "SCROLL_TIMEOUT_SECS",
            config.extraction.scroll_timeout.as_secs(),
        ));

        config
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.completion.api_key = api_key.into();
        self
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// User input for a single run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub video_url: String,
    pub api_key: String,
}

impl RunRequest {
    pub fn new(video_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            video_url: video_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.video_url.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "Please enter a video URL".to_string(),
            ));
        }
        if !self.video_url.trim().starts_with("http") {
            return Err(PipelineError::InvalidRequest(format!(
                "Not an http(s) URL: {}",
                self.video_url
            )));
        }
        if self.api_key.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "Please provide an API key for sentiment analysis".to_string(),
            ));
        }
        Ok(())
    }
}
