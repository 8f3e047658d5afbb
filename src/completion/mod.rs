//! Completion provider abstraction and the OpenAI-compatible chat adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors raised by completion providers.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Request failed in a way that is worth retrying (network, timeout, 429/5xx).
    #[error("Completion request failed transiently: {0}")]
    Transient(String),
    /// Provider rejected the request (bad request, quota, credentials); never retried.
    #[error("Completion provider rejected the request: {0}")]
    Rejected(String),
    /// Provider responded with a body the client could not interpret.
    #[error("Completion response was malformed: {0}")]
    Malformed(String),
}

impl CompletionError {
    /// Whether the retry policy should re-issue the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Interface implemented by text-generation backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate text for `prompt` using the given model identifier.
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, CompletionError>;
}

/// HTTP client for OpenAI-compatible `/chat/completions` endpoints (Groq, OpenAI, local).
pub struct ChatCompletionClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl ChatCompletionClient {
    /// Construct a client against the given provider endpoint.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .user_agent("docuspace/0.1")
            .timeout(timeout)
            .build()
            .map_err(|err| CompletionError::Malformed(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, CompletionError> {
        tracing::debug!(model, prompt_chars = prompt.len(), "Requesting completion");

        let body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.5,
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() || err.is_connect() {
                CompletionError::Transient(err.to_string())
            } else {
                CompletionError::Malformed(err.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Transient(format!("{status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Rejected(format!("{status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| CompletionError::Malformed(err.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| CompletionError::Malformed("response contained no choices".into()))
    }
}
