//! HTTP client wrapper for the vector index provider.
//!
//! Speaks the Qdrant REST dialect: one collection holds every document's vectors, and each
//! document is isolated behind a `namespace` payload field that similarity searches filter on.

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde_json::json;
use tokio::sync::Mutex;

use crate::index::types::{IndexError, Passage, QueryPoint, QueryResponse, QueryResponseResult, VectorRecord};

/// Client for namespaced vector storage and top-k similarity search.
pub struct VectorIndexClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    index_name: String,
    dimension: u64,
    // Serializes first-time index creation so concurrent ingestions into a fresh
    // deployment cannot race the exists-check. `true` once presence is verified.
    ensured: Mutex<bool>,
}

impl VectorIndexClient {
    /// Construct a new client for the given index endpoint.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        index_name: &str,
        dimension: u64,
        timeout: Duration,
    ) -> Result<Self, IndexError> {
        let client = Client::builder()
            .user_agent("docuspace/0.1")
            .timeout(timeout)
            .build()?;

        let base_url = normalize_base_url(base_url).map_err(IndexError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            index = index_name,
            dimension,
            "Initialized vector index HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
            index_name: index_name.to_string(),
            dimension,
            ensured: Mutex::new(false),
        })
    }

    /// Get-or-create the backing index, idempotently.
    ///
    /// Safe to call from concurrent ingestions: the in-process guard serializes the
    /// exists/create sequence, and a `409 Conflict` from a racing external writer is
    /// treated as success.
    pub async fn ensure_index(&self) -> Result<(), IndexError> {
        let mut ensured = self.ensured.lock().await;
        if *ensured {
            return Ok(());
        }

        if !self.index_exists().await? {
            tracing::debug!(
                index = %self.index_name,
                dimension = self.dimension,
                "Creating vector index"
            );
            self.create_index().await?;
            self.ensure_namespace_payload_index().await?;
        }

        *ensured = true;
        Ok(())
    }

    /// Upload vectors for one document under its namespace.
    pub async fn upsert(
        &self,
        namespace: &str,
        records: Vec<VectorRecord>,
    ) -> Result<usize, IndexError> {
        if records.is_empty() {
            return Ok(0);
        }

        let serialized: Vec<_> = records
            .into_iter()
            .map(|record| {
                json!({
                    "id": record.id,
                    "vector": record.vector,
                    "payload": {
                        "text": record.text,
                        "namespace": namespace,
                    },
                })
            })
            .collect();

        let count = serialized.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/points", self.index_name),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(namespace, points = count, "Vectors upserted");
        })
        .await?;

        Ok(count)
    }

    /// Perform a top-k similarity search scoped to one document's namespace.
    pub async fn search(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<Passage>, IndexError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
            "filter": {
                "must": [
                    { "key": "namespace", "match": { "value": namespace } }
                ]
            },
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.index_name),
            )?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(namespace, error = %error, "Similarity search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };

        Ok(points.into_iter().filter_map(passage_from_point).collect())
    }

    async fn index_exists(&self) -> Result<bool, IndexError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.index_name))?
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::error!(index = %self.index_name, error = %error, "Index existence check failed");
                Err(error)
            }
        }
    }

    async fn create_index(&self) -> Result<(), IndexError> {
        let body = json!({
            "vectors": {
                "size": self.dimension,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{}", self.index_name))?
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            tracing::debug!(index = %self.index_name, "Index already created by a concurrent writer");
            return Ok(());
        }

        self.ensure_success(response, || {
            tracing::info!(index = %self.index_name, dimension = self.dimension, "Vector index created");
        })
        .await
    }

    /// Ensure the `namespace` payload field is indexed so per-document filters stay fast.
    async fn ensure_namespace_payload_index(&self) -> Result<(), IndexError> {
        let body = json!({
            "field_name": "namespace",
            "field_schema": "keyword",
        });

        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/index", self.index_name),
            )?
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() || response.status() == StatusCode::CONFLICT {
            tracing::debug!(index = %self.index_name, "Namespace payload index ensured");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::warn!(index = %self.index_name, error = %error, "Failed to ensure namespace payload index");
            Ok(())
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, IndexError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        Ok(req)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), IndexError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Vector index request failed");
            Err(error)
        }
    }
}

fn passage_from_point(point: QueryPoint) -> Option<Passage> {
    let payload = point.payload?;
    let text = payload.get("text")?.as_str()?.to_string();
    Some(Passage {
        text,
        score: point.score,
    })
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
