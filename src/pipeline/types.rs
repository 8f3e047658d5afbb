//! Error and data types for the ingestion and query pipelines.

use thiserror::Error;

use crate::collab::CollabError;
use crate::completion::CompletionError;
use crate::embedding::EmbeddingError;
use crate::index::{IndexError, Passage};
use crate::pipeline::extract::ExtractError;
use crate::store::{MessageContext, StoreError};

/// Errors that flip an ingestion to `failed`.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Text extraction failed or yielded nothing.
    #[error(transparent)]
    Extraction(#[from] ExtractError),
    /// Embedding provider failed terminally or exhausted its retry budget.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// Vector index rejected the create or upsert.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Registry write failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Stable failure classifier used in responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Extraction(_) => "extraction_failed",
            Self::Embedding(_) => "embedding_failed",
            Self::Index(_) => "index_failed",
            Self::Store(_) => "persistence_failed",
        }
    }
}

/// Errors surfaced by the retriever/answerer.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Document does not exist or is not `ready`.
    #[error("Document not found")]
    DocumentNotFound,
    /// Conversation context lookup or authorization failed.
    #[error(transparent)]
    Access(#[from] CollabError),
    /// Similarity search matched nothing relevant; no answer was generated.
    #[error("No relevant content found for this query")]
    NoRelevantContent,
    /// Query embedding failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// Similarity search failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Completion provider failed.
    #[error("Completion failed: {0}")]
    Completion(#[from] CompletionError),
}

/// A retrieval-augmented question against one document.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Target document; must be registered and `ready`.
    pub document_id: String,
    /// Natural-language question.
    pub query: String,
    /// Completion model override; the configured default applies when absent.
    pub model: Option<String>,
    /// Space or chat the exchange belongs to, or none.
    pub context: MessageContext,
    /// Verified caller identity, when present.
    pub user_id: Option<String>,
}

/// A generated answer together with the passages that grounded it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryOutcome {
    /// The generated answer text.
    pub answer: String,
    /// Passages retrieved from the document, best match first.
    pub passages: Vec<Passage>,
    /// Model that produced the answer.
    pub model: String,
}
