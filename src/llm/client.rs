//! ChatClient - talks to OpenAI-compatible chat completion APIs.

use std::time::Duration;

use super::retry::{is_transient_network_error, parse_retry_after, RetryPolicy};
use super::types::{ChatMessage, ChatRequest, ChatResponse, ToolDefinition};

/// Default timeout for HTTP requests (60 seconds, vision calls are slow).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP status code for rate limiting.
const HTTP_STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Errors from model API calls.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API key not configured (set {0})")]
    MissingApiKey(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Response body as returned by the server
        body: String,
    },

    #[error("Rate limited: {message}")]
    RateLimit {
        /// Human-readable rate limit message
        message: String,
        /// Retry-After header value in seconds, if provided
        retry_after_secs: Option<u64>,
    },

    #[error("Network error: {message} (after {attempts} attempts)")]
    NetworkError {
        /// Human-readable network error message
        message: String,
        /// Number of attempts made before giving up
        attempts: u32,
    },

    #[error("Model returned no choices")]
    EmptyResponse,

    #[error("Invalid tool arguments: {0}")]
    InvalidToolArguments(String),
}

/// Client for one model on one OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    api_key: String,
    base_url: String,
    model: String,
    temperature: Option<f32>,
    retry: RetryPolicy,
    http_client: reqwest::Client,
}

impl ChatClient {
    /// Create a client with an explicit API key.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingApiKey` if the key is empty.
    pub fn new(api_key: String, base_url: &str, model: &str) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey("an API key".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature: None,
            retry: RetryPolicy::default(),
            http_client,
        })
    }

    /// Create a client reading the API key from `env_var`.
    pub fn from_env(env_var: &str, base_url: &str, model: &str) -> Result<Self, LlmError> {
        let api_key = std::env::var(env_var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(env_var.to_string()))?;
        Self::new(api_key, base_url, model)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Send one chat completion request and return the first choice.
    ///
    /// # Errors
    ///
    /// `LlmError::RateLimit` on 429, `LlmError::ApiError` on other non-2xx
    /// responses, `LlmError::EmptyResponse` when no choice comes back, or
    /// `LlmError::HttpError` if the request itself fails.
    pub async fn complete_once(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            tools,
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == HTTP_STATUS_TOO_MANY_REQUESTS {
                let retry_after_secs = parse_retry_after(&response);
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Rate limit exceeded".to_string());
                log::warn!(
                    "Rate limited by {}. Retry-After: {:?} seconds",
                    self.base_url,
                    retry_after_secs
                );
                return Err(LlmError::RateLimit {
                    message,
                    retry_after_secs,
                });
            }

            let body = response.text().await.unwrap_or_default();
            log::error!("Model API error {}: {}", status, body);
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or(LlmError::EmptyResponse)
    }

    /// Like [`complete_once`](Self::complete_once), retrying rate limits and
    /// transient network errors according to the client's retry policy.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage, LlmError> {
        let mut rate_limited = 0;
        let mut network_failures = 0;

        loop {
            match self.complete_once(messages, tools).await {
                Ok(message) => return Ok(message),
                Err(LlmError::RateLimit {
                    message,
                    retry_after_secs,
                }) => {
                    if rate_limited >= self.retry.max_retries {
                        log::error!(
                            "Rate limit exceeded after {} attempts. Giving up.",
                            rate_limited + 1
                        );
                        return Err(LlmError::RateLimit {
                            message,
                            retry_after_secs,
                        });
                    }
                    let delay = self.retry.delay(rate_limited, retry_after_secs);
                    log::info!("Retrying in {:?} (attempt {})", delay, rate_limited + 2);
                    tokio::time::sleep(delay).await;
                    rate_limited += 1;
                }
                Err(LlmError::HttpError(e)) if is_transient_network_error(&e) => {
                    if network_failures >= self.retry.network_retries {
                        return Err(LlmError::NetworkError {
                            message: e.to_string(),
                            attempts: network_failures + 1,
                        });
                    }
                    let delay = self.retry.delay(network_failures, None);
                    log::warn!("Network error: {}. Retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                    network_failures += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
