//! SQLite persistence for the document registry, spaces, chats, and the conversation log.
//!
//! A single pool is shared by every store handle. Row-level atomicity is all the pipeline
//! needs: one registry write or one log append at a time, no cross-table transactions
//! beyond the small ones used here.

mod chats;
mod documents;
mod messages;
mod spaces;

pub use chats::{Chat, ChatStore};
pub use documents::{Document, DocumentStatus, DocumentStore};
pub use messages::{Message, MessageContext, MessageKind, MessageStore, NewMessage};
pub use spaces::{Space, SpaceStore};

use std::path::Path;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;

/// Errors surfaced by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Open (creating if missing) the SQLite database at `path` and return a pool.
pub async fn connect(path: &Path) -> Result<SqlitePool, StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|err| {
            StoreError::Database(sqlx::Error::Io(err))
        })?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .map_err(StoreError::Database)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create all tables and indexes if they do not exist yet.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            filename TEXT NOT NULL,
            namespace TEXT NOT NULL UNIQUE,
            chunk_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS spaces (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            document_id TEXT NOT NULL,
            access_token TEXT NOT NULL UNIQUE,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS space_members (
            space_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            PRIMARY KEY (space_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chats (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            document_id TEXT,
            title TEXT NOT NULL,
            model TEXT NOT NULL,
            last_message_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            space_id TEXT,
            chat_id TEXT,
            user_id TEXT,
            kind TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_space ON messages(space_id, created_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id, created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Current UTC time as a fixed-width RFC3339 string (millisecond precision).
///
/// The fixed width keeps lexicographic and chronological order identical, which the
/// conversation log's `ORDER BY created_at` relies on.
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("options")
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("pool");
    init_schema(&pool).await.expect("schema");
    pool
}
