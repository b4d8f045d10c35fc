//! Best-effort translation of scraped comments.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{info, warn};

use crate::artifacts::ArtifactStore;
use crate::config::TranslationConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{IndexedComment, TranslationRecord};
use crate::stealth;

/// A remote translation backend.
#[async_trait]
pub trait TextTranslator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String>;

    /// Label written into the translations artifact header.
    fn method(&self) -> &str;
}

/// Google's public `translate_a/single` endpoint (`client=gtx`).
pub struct GoogleTranslator {
    client: reqwest::Client,
    config: TranslationConfig,
}

impl GoogleTranslator {
    pub fn new(config: TranslationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(stealth::random_user_agent())
            .timeout(config.timeout)
            .build()
            .context("Failed to create translation HTTP client")?;
        Ok(Self { client, config })
    }
}

/// Joins the translated segments of a gtx payload: `[[["seg", "orig", ...], ...], ...]`.
pub fn parse_gtx_response(body: &Value) -> Option<String> {
    let segments = body.get(0)?.as_array()?;
    let translated: String = segments
        .iter()
        .filter_map(|segment| segment.get(0)?.as_str())
        .collect();
    (!translated.trim().is_empty()).then_some(translated)
}

#[async_trait]
impl TextTranslator for GoogleTranslator {
    async fn translate(&self, text: &str) -> Result<String> {
        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", self.config.source_lang.as_str()),
                ("tl", self.config.target_lang.as_str()),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("translation endpoint returned {}", response.status());
        }

        let body: Value = response.json().await?;
        parse_gtx_response(&body).ok_or_else(|| anyhow!("unexpected translation payload"))
    }

    fn method(&self) -> &str {
        "Google Translate API (gtx)"
    }
}

async fn translate_one(backend: Arc<dyn TextTranslator>, comment: IndexedComment) -> TranslationRecord {
    let translated = match backend.translate(&comment.text).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            warn!("⚠️ Empty translation for comment {}, keeping original", comment.index);
            comment.text.clone()
        }
        Err(e) => {
            warn!("⚠️ Translation failed for comment {}: {:#}. Keeping original.", comment.index, e);
            comment.text.clone()
        }
    };
    TranslationRecord {
        index: comment.index,
        original: comment.text,
        translated,
    }
}

/// Translation stage. Per-item failures fall back to the original text.
pub struct Translator {
    backend: Arc<dyn TextTranslator>,
    concurrency: usize,
}

impl Translator {
    pub fn new(backend: Arc<dyn TextTranslator>, concurrency: usize) -> Self {
        Self {
            backend,
            concurrency: concurrency.max(1),
        }
    }

    /// Translates in input order with at most `concurrency` requests in flight.
    pub async fn translate_comments(&self, comments: &[IndexedComment]) -> Vec<TranslationRecord> {
        stream::iter(comments.to_vec())
            .map(|comment| translate_one(Arc::clone(&self.backend), comment))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Reads the comments artifact, translates it and writes the translations artifact.
    pub async fn translate_all(&self, store: &ArtifactStore) -> PipelineResult<usize> {
        let comments = store.read_comments().map_err(PipelineError::Translation)?;
        if comments.is_empty() {
            return Err(PipelineError::Translation(anyhow!("No comments found to translate")));
        }

        info!("🌐 Translating {} comments via {}", comments.len(), self.backend.method());
        let records = self.translate_comments(&comments).await;
        store.write_translations(&records, self.backend.method())?;

        let changed = records.iter().filter(|r| r.translated != r.original).count();
        info!("✅ Translated {} comments ({} changed)", records.len(), changed);
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Uppercase;

    #[async_trait]
    impl TextTranslator for Uppercase {
        async fn translate(&self, text: &str) -> Result<String> {
            Ok(text.to_uppercase())
        }
        fn method(&self) -> &str {
            "uppercase"
        }
    }

    /// Fails on every text containing "fail", counting calls.
    struct Flaky {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextTranslator for Flaky {
        async fn translate(&self, text: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("fail") {
                bail!("connection reset");
            }
            Ok(format!("[en] {}", text))
        }
        fn method(&self) -> &str {
            "flaky"
        }
    }

    /// Finishes later items first.
    struct Slow;

    #[async_trait]
    impl TextTranslator for Slow {
        async fn translate(&self, text: &str) -> Result<String> {
            let delay = 40u64.saturating_sub(text.len() as u64 * 10);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(text.to_string())
        }
        fn method(&self) -> &str {
            "slow"
        }
    }

    fn comment(index: usize, text: &str) -> IndexedComment {
        IndexedComment { index, text: text.to_string() }
    }

    #[test]
    fn test_parse_gtx_response_joins_segments() {
        let body = serde_json::json!([[["Hello. ", "Hola. ", null], ["How are you?", "¿Cómo estás?", null]], null, "es"]);
        assert_eq!(parse_gtx_response(&body).as_deref(), Some("Hello. How are you?"));
        assert_eq!(parse_gtx_response(&serde_json::json!([])), None);
        assert_eq!(parse_gtx_response(&serde_json::json!({"error": 1})), None);
    }

    #[tokio::test]
    async fn test_failed_item_keeps_original_text() {
        let translator = Translator::new(Arc::new(Flaky { calls: AtomicUsize::new(0) }), 1);
        let records = translator
            .translate_comments(&[comment(1, "hola"), comment(2, "please fail")])
            .await;

        assert_eq!(records[0].translated, "[en] hola");
        assert_eq!(records[1].translated, records[1].original);
        assert_eq!(records[1].original, "please fail");
    }

    #[tokio::test]
    async fn test_concurrent_translation_preserves_order() {
        let translator = Translator::new(Arc::new(Slow), 4);
        let input = vec![comment(1, "a"), comment(2, "bb"), comment(3, "ccc"), comment(4, "dddd")];
        let records = translator.translate_comments(&input).await;
        let indices: Vec<usize> = records.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_translate_all_writes_artifact() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::create(root.path(), "t1").unwrap();
        store
            .write_comments(&["hola".to_string(), "adiós".to_string()])
            .unwrap();

        let translator = Translator::new(Arc::new(Uppercase), 2);
        assert_eq!(translator.translate_all(&store).await.unwrap(), 2);

        let records = store.read_translations().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].index, 2);
        assert_eq!(records[1].original, "adiós");
        assert_eq!(records[1].translated, "ADIÓS");
    }

    #[tokio::test]
    async fn test_empty_input_fails_before_any_request() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::create(root.path(), "t2").unwrap();
        store.write_comments(&[]).unwrap();

        let backend = Arc::new(Flaky { calls: AtomicUsize::new(0) });
        let translator = Translator::new(backend.clone(), 1);
        let err = translator.translate_all(&store).await.unwrap_err();

        assert!(matches!(err, PipelineError::Translation(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_a_translation_error() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::create(root.path(), "t3").unwrap();
        let translator = Translator::new(Arc::new(Uppercase), 1);
        assert!(matches!(
            translator.translate_all(&store).await,
            Err(PipelineError::Translation(_))
        ));
    }
}
