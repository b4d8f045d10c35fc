//! Remote LLM completion client (OpenAI-compatible chat endpoint).

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::config::CompletionConfig;

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

pub struct ChatCompletionClient {
    http: reqwest::Client,
    config: CompletionConfig,
}

impl ChatCompletionClient {
    pub fn new(config: CompletionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create completion HTTP client")?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("completion request failed: {} {}", status, body.trim());
        }

        let reply: ChatResponse = response.json().await?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("completion response had no content"))
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CompletionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: config.retry_delay,
            attempt_timeout: config.request_timeout,
        }
    }
}

/// Runs `prompt` with bounded retry. `None` means every attempt failed.
pub async fn complete_with_retry(
    client: &dyn CompletionClient,
    prompt: &str,
    policy: &RetryPolicy,
) -> Option<String> {
    for attempt in 1..=policy.max_attempts {
        match timeout(policy.attempt_timeout, client.complete(prompt)).await {
            Ok(Ok(response)) => {
                if attempt > 1 {
                    debug!("✅ Completion succeeded on attempt {}/{}", attempt, policy.max_attempts);
                }
                return Some(response);
            }
            Ok(Err(e)) => {
                warn!("❌ Completion attempt {}/{} failed: {:#}", attempt, policy.max_attempts, e);
            }
            Err(_) => {
                warn!(
                    "⏳ Completion attempt {}/{} timed out after {:?}",
                    attempt, policy.max_attempts, policy.attempt_timeout
                );
            }
        }
        if attempt < policy.max_attempts {
            sleep(policy.delay).await;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then answers.
    struct FlakyClient {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyClient {
        fn new(failures: u32) -> Self {
            Self { failures, calls: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl CompletionClient for FlakyClient {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                bail!("503 Service Unavailable");
            }
            Ok("Sentiment: Positive".to_string())
        }
    }

    struct Hanging;

    #[async_trait]
    impl CompletionClient for Hanging {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            sleep(Duration::from_secs(30)).await;
            Ok(String::new())
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::ZERO,
            attempt_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let client = FlakyClient::new(2);
        let response = complete_with_retry(&client, "prompt", &policy()).await;
        assert_eq!(response.as_deref(), Some("Sentiment: Positive"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_three_failures() {
        let client = FlakyClient::new(3);
        assert_eq!(complete_with_retry(&client, "prompt", &policy()).await, None);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_hung_attempt_counts_as_failure() {
        let policy = RetryPolicy {
            max_attempts: 2,
            delay: Duration::ZERO,
            attempt_timeout: Duration::from_millis(20),
        };
        assert_eq!(complete_with_retry(&Hanging, "prompt", &policy).await, None);
    }

    #[test]
    fn test_request_shape() {
        let request = ChatRequest {
            model: "meta/llama-3.1-8b-instruct",
            messages: vec![ChatMessage { role: "user", content: "hi" }],
            temperature: 0.1,
            top_p: 0.7,
            max_tokens: 512,
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 512);
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let client = ChatCompletionClient::new(CompletionConfig {
            base_url: "https://integrate.api.nvidia.com/v1/".to_string(),
            ..CompletionConfig::default()
        })
        .unwrap();
        assert_eq!(client.endpoint(), "https://integrate.api.nvidia.com/v1/chat/completions");
    }
}
