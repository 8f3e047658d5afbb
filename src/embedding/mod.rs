//! Embedding provider abstraction and adapters.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Provider rejected the configured credentials; never retried.
    #[error("Embedding provider rejected credentials: {0}")]
    Auth(String),
    /// Request failed in a way that is worth retrying (network, timeout, 429/5xx).
    #[error("Embedding request failed transiently: {0}")]
    Transient(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    Generation(String),
}

impl EmbeddingError {
    /// Whether the retry policy should re-issue the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text, in input order.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// HTTP embedding client speaking the Hugging Face feature-extraction protocol.
pub struct HttpEmbeddingClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl HttpEmbeddingClient {
    /// Construct a client against the given provider endpoint.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .user_agent("docuspace/0.1")
            .timeout(timeout)
            .build()
            .map_err(|err| EmbeddingError::Generation(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            dimension,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/pipeline/feature-extraction/{}",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Err(EmbeddingError::Generation("no texts provided".into()));
        }

        let expected = texts.len();
        tracing::debug!(model = %self.model, texts = expected, "Generating embeddings");

        let mut request = self
            .client
            .post(self.endpoint())
            .json(&json!({ "inputs": texts, "options": { "wait_for_model": true } }));
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(classify_transport_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Auth(format!("{status}: {body}")));
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Transient(format!("{status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Generation(format!("{status}: {body}")));
        }

        let vectors: Vec<Vec<f32>> = response
            .json()
            .await
            .map_err(|err| EmbeddingError::Generation(err.to_string()))?;

        if vectors.len() != expected {
            return Err(EmbeddingError::Generation(format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                expected
            )));
        }
        if let Some(vector) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(EmbeddingError::Generation(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }

        Ok(vectors)
    }
}

fn classify_transport_error(err: reqwest::Error) -> EmbeddingError {
    if err.is_timeout() || err.is_connect() {
        EmbeddingError::Transient(err.to_string())
    } else {
        EmbeddingError::Generation(err.to_string())
    }
}

/// Deterministic fallback embedding client for development and tests.
///
/// Hashes byte content into a fixed-dimension vector and normalizes it. Retrieval quality is
/// poor but stable, which is what a provider-less setup needs.
pub struct HashEmbeddingClient {
    dimension: usize,
}

impl HashEmbeddingClient {
    /// Construct a deterministic client producing vectors of `dimension`.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % self.dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.dimension == 0 {
            return Err(EmbeddingError::Generation(
                "embedding dimension must be greater than zero".into(),
            ));
        }
        if texts.is_empty() {
            return Err(EmbeddingError::Generation("no texts provided".into()));
        }

        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}
