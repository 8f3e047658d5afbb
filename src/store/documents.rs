//! Document registry: durable metadata for every ingested document.

use serde::Serialize;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use super::{StoreError, now_rfc3339};

/// Ingestion status of a registered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Ingestion is in flight; the document is not queryable.
    Pending,
    /// Fully indexed and queryable.
    Ready,
    /// Ingestion failed; the document is not queryable.
    Failed,
}

impl DocumentStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "ready" => Self::Ready,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Registered document metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    /// Document identifier (UUID).
    pub id: String,
    /// Title derived from the uploaded filename.
    pub title: String,
    /// Original filename of the uploaded source.
    pub filename: String,
    /// Namespace isolating this document's vectors inside the shared index.
    pub namespace: String,
    /// Number of chunks indexed for the document (0 until `ready`).
    pub chunk_count: i64,
    /// Current ingestion status.
    pub status: DocumentStatus,
    /// RFC3339 creation timestamp.
    pub created_at: String,
}

/// Store handle for the documents table.
#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    /// Wrap a pool in a document store handle.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a `pending` placeholder record for a document whose ingestion just started.
    pub async fn insert_pending(
        &self,
        id: &str,
        title: &str,
        filename: &str,
        namespace: &str,
    ) -> Result<Document, StoreError> {
        let created_at = now_rfc3339();
        sqlx::query(
            "INSERT INTO documents (id, title, filename, namespace, chunk_count, status, created_at)
             VALUES (?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(id)
        .bind(title)
        .bind(filename)
        .bind(namespace)
        .bind(DocumentStatus::Pending.as_str())
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        Ok(Document {
            id: id.to_string(),
            title: title.to_string(),
            filename: filename.to_string(),
            namespace: namespace.to_string(),
            chunk_count: 0,
            status: DocumentStatus::Pending,
            created_at,
        })
    }

    /// Flip a document to `ready` with its final chunk count. Only called after every
    /// vector reached the index.
    pub async fn mark_ready(&self, id: &str, chunk_count: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE documents SET status = ?, chunk_count = ? WHERE id = ?")
            .bind(DocumentStatus::Ready.as_str())
            .bind(chunk_count)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Flip a document to `failed`.
    pub async fn mark_failed(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE documents SET status = ? WHERE id = ?")
            .bind(DocumentStatus::Failed.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Fetch one document by id.
    pub async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| document_from_row(&row)))
    }

    /// List all documents, newest first.
    pub async fn list(&self) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query("SELECT * FROM documents ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(document_from_row).collect())
    }
}

fn document_from_row(row: &SqliteRow) -> Document {
    let status: String = row.get("status");
    Document {
        id: row.get("id"),
        title: row.get("title"),
        filename: row.get("filename"),
        namespace: row.get("namespace"),
        chunk_count: row.get("chunk_count"),
        status: DocumentStatus::parse(&status),
        created_at: row.get("created_at"),
    }
}
