//! Document ingestion and retrieval-augmented query pipelines.

pub mod chunking;
pub mod extract;
mod ingest;
mod query;
mod types;

use std::sync::Arc;

use crate::collab::CollabService;
use crate::completion::CompletionClient;
use crate::embedding::EmbeddingClient;
use crate::index::VectorIndexClient;
use crate::metrics::PipelineMetrics;
use crate::retry::RetryPolicy;
use crate::store::DocumentStore;

pub use extract::ExtractError;
pub use types::{IngestError, QueryError, QueryOutcome, QueryRequest};

/// Tunables shared by the ingestion and query flows.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters.
    pub chunk_overlap: usize,
    /// Number of passages retrieved per query.
    pub search_top_k: usize,
    /// Maximum simultaneous in-flight embedding batches.
    pub embedding_concurrency: usize,
    /// Completion model used when a query does not select one.
    pub completion_model: String,
    /// Retry policy for embedding and completion calls.
    pub retry: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
            search_top_k: 4,
            embedding_concurrency: 5,
            completion_model: "llama3-70b-8192".into(),
            retry: RetryPolicy::default(),
        }
    }
}

/// The ingestion and query engine, shared across request handlers.
#[derive(Clone)]
pub struct PipelineService {
    embedding: Arc<dyn EmbeddingClient>,
    completion: Arc<dyn CompletionClient>,
    index: Arc<VectorIndexClient>,
    documents: DocumentStore,
    collab: CollabService,
    metrics: Arc<PipelineMetrics>,
    settings: PipelineSettings,
}

impl PipelineService {
    /// Assemble the pipeline from its provider clients and stores.
    pub fn new(
        embedding: Arc<dyn EmbeddingClient>,
        completion: Arc<dyn CompletionClient>,
        index: Arc<VectorIndexClient>,
        documents: DocumentStore,
        collab: CollabService,
        metrics: Arc<PipelineMetrics>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            embedding,
            completion,
            index,
            documents,
            collab,
            metrics,
            settings,
        }
    }

    /// Current ingestion and query counters.
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Completion model used when a request does not select one.
    pub fn default_model(&self) -> &str {
        &self.settings.completion_model
    }
}
