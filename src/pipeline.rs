//! Extract → translate → analyze, with per-run artifacts.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use crate::analyzer::SentimentAnalyzer;
use crate::artifacts::ArtifactStore;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::extractor::{BrowserExtractor, CommentSource};
use crate::llm::{ChatCompletionClient, CompletionClient, RetryPolicy};
use crate::models::PipelineReport;
use crate::translator::{GoogleTranslator, TextTranslator, Translator};

pub struct Pipeline {
    config: PipelineConfig,
    source: Arc<dyn CommentSource>,
    translator: Translator,
    analyzer: SentimentAnalyzer,
}

impl Pipeline {
    /// Wires the pipeline to explicit stage backends.
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn CommentSource>,
        translation: Arc<dyn TextTranslator>,
        completion: Arc<dyn CompletionClient>,
    ) -> Self {
        let translator = Translator::new(translation, config.concurrency);
        let analyzer = SentimentAnalyzer::new(
            completion,
            RetryPolicy::from_config(&config.completion),
            config.concurrency,
        );
        Self {
            config,
            source,
            translator,
            analyzer,
        }
    }

    /// Headless Chrome, Google translate and the configured chat endpoint.
    pub fn from_config(config: PipelineConfig) -> PipelineResult<Self> {
        let source = Arc::new(BrowserExtractor::new(config.extraction.clone()));
        let translation =
            Arc::new(GoogleTranslator::new(config.translation.clone()).map_err(PipelineError::Setup)?);
        let completion = Arc::new(
            ChatCompletionClient::new(config.completion.clone()).map_err(PipelineError::Setup)?,
        );
        Ok(Self::new(config, source, translation, completion))
    }

    /// One full run. Artifacts are removed before returning, whatever the outcome.
    pub async fn run(&self, video_url: &str) -> PipelineResult<PipelineReport> {
        let run_id = Uuid::new_v4().to_string();
        let mut store = ArtifactStore::create(&self.config.artifact_dir, &run_id)?;
        info!("🚀 [{}] Starting analysis for {}", run_id, video_url);

        let result = self.run_stages(video_url, &store).await;
        store.cleanup();

        match &result {
            Ok(report) => info!(
                "🎉 [{}] Analysis complete: {}/{} comments classified",
                run_id,
                report.counts.total(),
                report.extracted
            ),
            Err(e) => error!("❌ [{}] {}", run_id, e),
        }
        result
    }

    async fn run_stages(&self, video_url: &str, store: &ArtifactStore) -> PipelineResult<PipelineReport> {
        // 1. Extract
        info!("🎬 Extracting comments...");
        let extraction = self
            .source
            .fetch_comments(video_url)
            .await
            .map_err(PipelineError::Extraction)?;
        store.write_comments(&extraction.comments)?;

        // 2. Translate
        let translated = self.translator.translate_all(store).await?;

        // 3. Analyze
        let analysis = self.analyzer.analyze_all(store).await?;

        Ok(PipelineReport {
            video_url: video_url.to_string(),
            analyzed_at: Utc::now(),
            extracted: extraction.comments.len(),
            translated,
            fully_loaded: extraction.fully_loaded,
            results: analysis.results,
            counts: analysis.counts,
            dropped: analysis.dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ExtractionOutcome;
    use crate::models::Sentiment;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubSource(Result<Vec<&'static str>, &'static str>);

    #[async_trait]
    impl CommentSource for StubSource {
        async fn fetch_comments(&self, _page_url: &str) -> Result<ExtractionOutcome> {
            match &self.0 {
                Ok(comments) => Ok(ExtractionOutcome {
                    comments: comments.iter().map(|c| c.to_string()).collect(),
                    fully_loaded: true,
                }),
                Err(msg) => bail!("{}", msg),
            }
        }
    }

    #[derive(Default)]
    struct Identity {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextTranslator for Identity {
        async fn translate(&self, text: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.to_string())
        }
        fn method(&self) -> &str {
            "identity"
        }
    }

    struct ByKeyword;

    #[async_trait]
    impl CompletionClient for ByKeyword {
        async fn complete(&self, prompt: &str) -> Result<String> {
            let label = if prompt.contains("Love this!") {
                "Positive"
            } else if prompt.contains("Terrible video") {
                "Negative"
            } else {
                "Neutral"
            };
            Ok(format!("Sentiment: {label}\nConfidence: 80%\nKey_Words: -\nReasoning: stub"))
        }
    }

    fn config(root: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::default().with_api_key("test");
        config.artifact_dir = root.to_path_buf();
        config.completion.retry_delay = Duration::ZERO;
        config.concurrency = 2;
        config
    }

    fn assert_no_artifacts(root: &Path) {
        let leftovers: Vec<_> = std::fs::read_dir(root).unwrap().collect();
        assert!(leftovers.is_empty(), "artifacts left behind: {:?}", leftovers);
    }

    #[tokio::test]
    async fn test_three_comment_scenario() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            config(root.path()),
            Arc::new(StubSource(Ok(vec!["Love this!", "Terrible video", "It rained yesterday"]))),
            Arc::new(Identity::default()),
            Arc::new(ByKeyword),
        );

        let report = pipeline.run("https://youtu.be/demo").await.unwrap();

        assert_eq!(report.counts.positive, 1);
        assert_eq!(report.counts.negative, 1);
        assert_eq!(report.counts.neutral, 1);
        let labels: Vec<Sentiment> = report.results.iter().map(|r| r.sentiment).collect();
        assert_eq!(labels, vec![Sentiment::Positive, Sentiment::Negative, Sentiment::Neutral]);
        assert_eq!(report.results[2].text, "It rained yesterday");
        assert_eq!(report.extracted, 3);
        assert_eq!(report.translated, 3);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.coverage(), 1.0);
        assert_no_artifacts(root.path());
    }

    #[tokio::test]
    async fn test_run_executes_on_a_spawned_task() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            config(root.path()),
            Arc::new(StubSource(Ok(vec!["Love this!", "Terrible video"]))),
            Arc::new(Identity::default()),
            Arc::new(ByKeyword),
        );

        let report = tokio::spawn(async move { pipeline.run("https://youtu.be/bg").await })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.counts.positive, 1);
        assert_eq!(report.counts.negative, 1);
        assert_eq!(report.results[0].index, 1);
        assert_no_artifacts(root.path());
    }

    #[tokio::test]
    async fn test_no_comments_fails_in_translation_without_requests() {
        let root = tempfile::tempdir().unwrap();
        let translator = Arc::new(Identity::default());
        let pipeline = Pipeline::new(
            config(root.path()),
            Arc::new(StubSource(Ok(vec![]))),
            translator.clone(),
            Arc::new(ByKeyword),
        );

        let err = pipeline.run("https://youtu.be/empty").await.unwrap_err();

        assert!(matches!(err, PipelineError::Translation(_)));
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
        assert_no_artifacts(root.path());
    }

    #[tokio::test]
    async fn test_extraction_failure_leaves_no_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            config(root.path()),
            Arc::new(StubSource(Err("net::ERR_NAME_NOT_RESOLVED"))),
            Arc::new(Identity::default()),
            Arc::new(ByKeyword),
        );

        let err = pipeline.run("https://invalid.example").await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Error extracting comments: net::ERR_NAME_NOT_RESOLVED"
        );
        assert_no_artifacts(root.path());
    }
}
