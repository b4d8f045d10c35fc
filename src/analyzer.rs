//! LLM-backed sentiment classification.
//!
//! Each statement gets one templated prompt. The reply is parsed in two passes:
//! a case-insensitive scan for any label word sets a default, then an explicit
//! `Sentiment:` line naming a valid label overrides it.

use std::sync::Arc;

use anyhow::anyhow;
use chrono::Local;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::artifacts::ArtifactStore;
use crate::error::{PipelineError, PipelineResult};
use crate::llm::{complete_with_retry, CompletionClient, RetryPolicy};
use crate::models::{AnalysisOutcome, Sentiment, SentimentCounts, SentimentResult, TranslationRecord};

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

pub const DEFAULT_CONFIDENCE: u8 = 50;
const DEFAULT_KEY_WORDS: &str = "None identified";
const DEFAULT_REASONING: &str = "No reasoning provided";

pub fn build_prompt(text: &str) -> String {
    format!(
        r#"
Analyze the SENTIMENT of this text - meaning the emotional tone expressed in the words.

Focus on:
- The actual words chosen (positive, negative, neutral)
- Emotional indicators in the language
- Intensity of the sentiment expressed
- Overall tone and feeling conveyed

TEXT: "{text}"

Classify the sentiment as:
- Positive: Expresses satisfaction, happiness, approval, gratitude, or other positive emotions
- Negative: Expresses dissatisfaction, anger, disappointment, frustration, or other negative emotions
- Neutral: Factual, balanced, or lacks clear emotional indicators

ANSWER FORMAT:
Sentiment: [Positive/Negative/Neutral]
Confidence: [0-100]%
Key_Words: [Words that indicate this sentiment]
Reasoning: [Brief explanation of why]
"#
    )
}

/// Parsed model reply. `sentiment == None` is the failure sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSentiment {
    pub sentiment: Option<Sentiment>,
    pub confidence: u8,
    pub key_words: String,
    pub reasoning: String,
}

impl ParsedSentiment {
    pub fn failed() -> Self {
        Self {
            sentiment: None,
            confidence: DEFAULT_CONFIDENCE,
            key_words: DEFAULT_KEY_WORDS.to_string(),
            reasoning: DEFAULT_REASONING.to_string(),
        }
    }
}

fn scan_for_label(response: &str) -> Option<Sentiment> {
    let lower = response.to_lowercase();
    // Fixed precedence: positive, negative, neutral
    Sentiment::ALL
        .into_iter()
        .find(|s| lower.contains(&s.as_str().to_lowercase()))
}

fn parse_confidence(line: &str) -> u8 {
    match DIGITS.find(line) {
        // ASCII digits only, so a failed parse means overflow
        Some(m) => m.as_str().parse::<u64>().map_or(100, |n| n.min(100) as u8),
        None => DEFAULT_CONFIDENCE,
    }
}

fn after_colon(line: &str) -> String {
    line.split_once(':')
        .map(|(_, rest)| rest.trim().to_string())
        .unwrap_or_default()
}

pub fn parse_response(response: &str) -> ParsedSentiment {
    let mut parsed = ParsedSentiment::failed();
    if response.trim().is_empty() {
        return parsed;
    }

    parsed.sentiment = scan_for_label(response);

    for line in response.lines().map(str::trim) {
        if line.starts_with("Sentiment:") {
            if let Some(label) = Sentiment::from_label(&after_colon(line)) {
                parsed.sentiment = Some(label);
            }
        } else if line.starts_with("Confidence:") {
            parsed.confidence = parse_confidence(line);
        } else if line.starts_with("Key_Words:") {
            parsed.key_words = after_colon(line);
        } else if line.starts_with("Reasoning:") {
            parsed.reasoning = after_colon(line);
        }
    }

    parsed
}

async fn classify(client: &dyn CompletionClient, text: &str, policy: &RetryPolicy) -> ParsedSentiment {
    match complete_with_retry(client, &build_prompt(text), policy).await {
        Some(response) => parse_response(&response),
        None => ParsedSentiment::failed(),
    }
}

/// Analysis stage.
pub struct SentimentAnalyzer {
    client: Arc<dyn CompletionClient>,
    policy: RetryPolicy,
    concurrency: usize,
}

impl SentimentAnalyzer {
    pub fn new(client: Arc<dyn CompletionClient>, policy: RetryPolicy, concurrency: usize) -> Self {
        Self {
            client,
            policy,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn analyze_text(&self, text: &str) -> ParsedSentiment {
        classify(self.client.as_ref(), text, &self.policy).await
    }

    /// Classifies every record with a non-empty translation, in input order.
    /// Items without a usable classification are counted in `dropped`.
    pub async fn analyze_records(&self, records: &[TranslationRecord]) -> AnalysisOutcome {
        let statements: Vec<TranslationRecord> = records
            .iter()
            .filter(|r| !r.translated.trim().is_empty())
            .cloned()
            .collect();

        let parsed: Vec<(TranslationRecord, ParsedSentiment)> = stream::iter(statements)
            .map(|record| {
                let client = Arc::clone(&self.client);
                let policy = self.policy.clone();
                async move {
                    let analysis = classify(client.as_ref(), &record.translated, &policy).await;
                    (record, analysis)
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut outcome = AnalysisOutcome::default();
        for (record, analysis) in parsed {
            let Some(sentiment) = analysis.sentiment else {
                warn!("⚠️ No usable sentiment for statement {}, dropping it", record.index);
                outcome.dropped += 1;
                continue;
            };
            outcome.counts.record(sentiment);
            outcome.results.push(SentimentResult {
                index: record.index,
                text: record.translated,
                sentiment,
                confidence: analysis.confidence,
                key_words: analysis.key_words,
                reasoning: analysis.reasoning,
            });
        }
        outcome
    }

    /// Reads the translations artifact, classifies it and writes the report.
    pub async fn analyze_all(&self, store: &ArtifactStore) -> PipelineResult<AnalysisOutcome> {
        let records = store.read_translations().map_err(PipelineError::Analysis)?;
        if records.iter().all(|r| r.translated.trim().is_empty()) {
            return Err(PipelineError::Analysis(anyhow!("No translated comments found")));
        }

        info!("🎭 Analyzing sentiment of {} statements", records.len());
        let outcome = self.analyze_records(&records).await;
        store.write_report(&outcome, Local::now())?;

        let counts: &SentimentCounts = &outcome.counts;
        info!(
            "✅ Sentiment: {} positive, {} negative, {} neutral, {} dropped",
            counts.positive, counts.negative, counts.neutral, outcome.dropped
        );
        Ok(outcome)
    }
}
