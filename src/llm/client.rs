use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

/// Upper bound for a single retry delay.
const MAX_RETRY_DELAY_MS: u64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Empty response from LLM")]
    EmptyResponse,
}

impl LlmError {
    /// Errors worth another attempt: network trouble, timeouts, 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Timeout(_) => true,
            Self::EmptyResponse => false,
        }
    }
}

/// A chat-completion backend that turns one prompt into one reply.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Per-attempt timeout and bounded exponential backoff for transient errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            max_retries: config.max_retries,
            base_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_backoff
            .saturating_mul(factor)
            .min(Duration::from_millis(MAX_RETRY_DELAY_MS))
    }
}

/// Call `client` with a timeout per attempt, retrying transient failures.
pub async fn complete_with_retry(
    client: &dyn CompletionClient,
    prompt: &str,
    policy: RetryPolicy,
) -> Result<String, LlmError> {
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(policy.timeout, client.complete(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(policy.timeout)),
        };

        match result {
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                tracing::debug!(
                    "LLM attempt {} failed ({e}), retrying in {delay:?}",
                    attempt + 1
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// OpenAI-compatible chat completions client.
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: Client,
}

impl LlmClient {
    /// Construct an LlmClient from config. Returns `None` if disabled or the
    /// API key env var is unset or empty.
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        let api_key = match std::env::var(&config.api_key_env) {
            Ok(v) if !v.trim().is_empty() => v,
            _ => {
                tracing::info!(
                    "LLM disabled: env var {} is not set, using fallback summaries",
                    config.api_key_env
                );
                return None;
            }
        };

        Self::new(config, api_key)
    }

    pub fn new(config: &LlmConfig, api_key: String) -> Option<Self> {
        let client = match Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("Failed to build LLM HTTP client: {e}");
                return None;
            }
        };

        Some(Self {
            api_key,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client,
        })
    }

    async fn parse_api_response<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, LlmError> {
        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }
        Ok(resp.json().await?)
    }

    async fn call_openai(&self, prompt: &str) -> Result<String, LlmError> {
        let body = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.max_tokens,
            temperature: Some(self.temperature),
        };

        let resp = self
            .client
            .post(self.chat_completions_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let parsed: OpenAIResponse = Self::parse_api_response(resp).await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    fn chat_completions_url(&self) -> String {
        url_with_v1_path(&self.base_url, "chat/completions")
    }
}

#[async_trait]
impl CompletionClient for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.call_openai(prompt).await
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize, Clone)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

fn url_with_v1_path(base_url: &str, suffix: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let suffix = suffix.trim_start_matches('/');
    if base.ends_with("/v1") {
        format!("{base}/{suffix}")
    } else {
        format!("{base}/v1/{suffix}")
    }
}
