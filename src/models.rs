//! Data carried between the pipeline stages and handed to report consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// One scraped comment with pictographs removed and whitespace trimmed.
pub type RawComment = String;

/// A comment read back from the comments artifact, keeping its 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedComment {
    pub index: usize,
    pub text: String,
}

/// Original text paired with its best-effort translation.
///
/// `translated` equals `original` when the remote translation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TranslationRecord {
    pub index: usize,
    pub original: String,
    pub translated: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Negative, Sentiment::Neutral];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "Positive",
            Sentiment::Negative => "Negative",
            Sentiment::Neutral => "Neutral",
        }
    }

    /// Exact, case-sensitive label match.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == label)
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Classification of a single comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SentimentResult {
    pub index: usize,
    pub text: String,
    pub sentiment: Sentiment,
    /// Percent, 0..=100
    pub confidence: u8,
    pub key_words: String,
    pub reasoning: String,
}

/// Per-label totals over successfully classified comments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SentimentCounts {
    #[serde(rename = "Positive")]
    pub positive: usize,
    #[serde(rename = "Negative")]
    pub negative: usize,
    #[serde(rename = "Neutral")]
    pub neutral: usize,
}

impl SentimentCounts {
    pub fn record(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Negative => self.negative += 1,
            Sentiment::Neutral => self.neutral += 1,
        }
    }

    pub fn get(&self, sentiment: Sentiment) -> usize {
        match sentiment {
            Sentiment::Positive => self.positive,
            Sentiment::Negative => self.negative,
            Sentiment::Neutral => self.neutral,
        }
    }

    pub fn total(&self) -> usize {
        self.positive + self.negative + self.neutral
    }

    /// Share of `sentiment` in percent. Zero when nothing was counted.
    pub fn percentage(&self, sentiment: Sentiment) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.get(sentiment) as f64 / total as f64 * 100.0
    }
}

/// Output of the analysis stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisOutcome {
    pub results: Vec<SentimentResult>,
    pub counts: SentimentCounts,
    /// Items whose classification could not be obtained or parsed.
    pub dropped: usize,
}

/// Everything a dashboard needs from one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PipelineReport {
    pub video_url: String,
    pub analyzed_at: DateTime<Utc>,
    /// Comments kept after scraping
    pub extracted: usize,
    pub translated: usize,
    /// False when scrolling stopped on its safety bound instead of converging
    pub fully_loaded: bool,
    pub results: Vec<SentimentResult>,
    pub counts: SentimentCounts,
    pub dropped: usize,
}

impl PipelineReport {
    /// Fraction of extracted comments that made it into the counts.
    pub fn coverage(&self) -> f64 {
        if self.extracted == 0 {
            return 0.0;
        }
        self.counts.total() as f64 / self.extracted as f64
    }
}
