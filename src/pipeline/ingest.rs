//! Ingestion flow: extract, chunk, embed, index, register.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use uuid::Uuid;

use crate::embedding::EmbeddingError;
use crate::index::VectorRecord;
use crate::pipeline::extract::{self, ExtractError};
use crate::pipeline::types::IngestError;
use crate::pipeline::{PipelineService, chunking};
use crate::store::Document;

// Chunks embedded per provider request; batches run concurrently up to the
// configured embedding concurrency.
const EMBED_BATCH_SIZE: usize = 32;

impl PipelineService {
    /// Ingest a PDF already materialized on disk, registering it as a queryable document.
    ///
    /// The registry record is created `pending` before any provider call and flipped to
    /// `ready` only once every vector has reached the index; any failure flips it to
    /// `failed` instead, so a partially indexed document is never queryable.
    pub async fn ingest_document(
        &self,
        path: PathBuf,
        filename: &str,
    ) -> Result<Document, IngestError> {
        let text = tokio::task::spawn_blocking(move || extract::extract_text(&path))
            .await
            .map_err(|err| ExtractError::Pdf(format!("extraction task failed: {err}")))??;

        let chunks = chunking::chunk_text(&text, self.settings.chunk_size, self.settings.chunk_overlap);
        if chunks.is_empty() {
            return Err(ExtractError::Empty.into());
        }

        let title = filename
            .rsplit_once('.')
            .map_or(filename, |(stem, _)| stem)
            .to_string();
        let namespace = new_namespace();
        let document = self
            .documents
            .insert_pending(&Uuid::new_v4().to_string(), &title, filename, &namespace)
            .await?;

        tracing::info!(
            document = %document.id,
            namespace = %namespace,
            chunks = chunks.len(),
            "Ingesting document"
        );

        match self.index_chunks(&namespace, chunks).await {
            Ok(count) => {
                self.documents.mark_ready(&document.id, count as i64).await?;
                self.metrics.record_document(count as u64);
                tracing::info!(document = %document.id, chunks = count, "Document ready");
                Ok(Document {
                    chunk_count: count as i64,
                    status: crate::store::DocumentStatus::Ready,
                    ..document
                })
            }
            Err(error) => {
                tracing::error!(
                    document = %document.id,
                    kind = error.kind(),
                    error = %error,
                    "Ingestion failed"
                );
                if let Err(store_error) = self.documents.mark_failed(&document.id).await {
                    tracing::warn!(
                        document = %document.id,
                        error = %store_error,
                        "Failed to mark document as failed"
                    );
                }
                Err(error)
            }
        }
    }

    async fn index_chunks(&self, namespace: &str, chunks: Vec<String>) -> Result<usize, IngestError> {
        let vectors = self.embed_chunks(&chunks).await?;

        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(text, vector)| VectorRecord {
                id: Uuid::new_v4().to_string(),
                vector,
                text,
            })
            .collect();

        self.index.ensure_index().await?;
        Ok(self.index.upsert(namespace, records).await?)
    }

    /// Embed every chunk, in order, through bounded-concurrency batches.
    async fn embed_chunks(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let retry = self.settings.retry;
        // Materialized eagerly: a lazy iterator borrowing `self` across the
        // `buffered` await trips rustc's "Send is not general enough" check.
        let batches: Vec<_> = chunks
            .chunks(EMBED_BATCH_SIZE)
            .map(|batch| {
                let client = Arc::clone(&self.embedding);
                let batch = batch.to_vec();
                async move {
                    retry
                        .run(
                            || {
                                let client = Arc::clone(&client);
                                let batch = batch.clone();
                                async move { client.embed(batch).await }
                            },
                            EmbeddingError::is_transient,
                        )
                        .await
                }
            })
            .collect();

        // `buffered` preserves batch order, so vectors line up with their chunks.
        let embedded: Vec<Vec<Vec<f32>>> = stream::iter(batches)
            .buffered(self.settings.embedding_concurrency.max(1))
            .try_collect()
            .await?;

        Ok(embedded.into_iter().flatten().collect())
    }
}

fn new_namespace() -> String {
    let fragment: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("doc-{}-{}", Utc::now().timestamp_millis(), fragment)
}
