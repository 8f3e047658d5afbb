//! Chats: private single-user conversations, optionally bound to a document.

use serde::Serialize;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::{StoreError, now_rfc3339};

/// A private conversation owned by exactly one user.
#[derive(Debug, Clone, Serialize)]
pub struct Chat {
    /// Chat identifier (UUID).
    pub id: String,
    /// Owning user; the only one allowed to read or write this chat.
    pub owner_id: String,
    /// Optional document the chat is grounded in; `None` means document-less conversation.
    pub document_id: Option<String>,
    /// Mutable display title.
    pub title: String,
    /// Preferred completion model for this chat.
    pub model: String,
    /// RFC3339 timestamp of the most recent message, used for recency ordering.
    pub last_message_at: String,
    /// RFC3339 creation timestamp.
    pub created_at: String,
}

/// Store handle for the chats table.
#[derive(Clone)]
pub struct ChatStore {
    pool: SqlitePool,
}

impl ChatStore {
    /// Wrap a pool in a chat store handle.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a chat. A missing title defaults to one derived from the creation time.
    pub async fn create(
        &self,
        owner_id: &str,
        document_id: Option<&str>,
        title: Option<&str>,
        model: &str,
    ) -> Result<Chat, StoreError> {
        let created_at = now_rfc3339();
        let chat = Chat {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            document_id: document_id.map(str::to_string),
            title: title
                .map(str::to_string)
                .unwrap_or_else(|| format!("Chat {created_at}")),
            model: model.to_string(),
            last_message_at: created_at.clone(),
            created_at,
        };

        sqlx::query(
            "INSERT INTO chats (id, owner_id, document_id, title, model, last_message_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&chat.id)
        .bind(&chat.owner_id)
        .bind(&chat.document_id)
        .bind(&chat.title)
        .bind(&chat.model)
        .bind(&chat.last_message_at)
        .bind(&chat.created_at)
        .execute(&self.pool)
        .await?;

        Ok(chat)
    }

    /// Fetch one chat by id.
    pub async fn get(&self, id: &str) -> Result<Option<Chat>, StoreError> {
        let row = sqlx::query("SELECT * FROM chats WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| chat_from_row(&row)))
    }

    /// List a user's chats, most recently active first.
    pub async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Chat>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM chats WHERE owner_id = ? ORDER BY last_message_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(chat_from_row).collect())
    }

    /// Rename a chat. Returns `false` when the chat does not exist or is not owned by the caller.
    pub async fn rename(&self, id: &str, owner_id: &str, title: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE chats SET title = ? WHERE id = ? AND owner_id = ?")
            .bind(title)
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a chat and its messages. Returns `false` when nothing matched.
    pub async fn delete(&self, id: &str, owner_id: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM chats WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
        sqlx::query("DELETE FROM messages WHERE chat_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }
}

fn chat_from_row(row: &SqliteRow) -> Chat {
    Chat {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        document_id: row.get("document_id"),
        title: row.get("title"),
        model: row.get("model"),
        last_message_at: row.get("last_message_at"),
        created_at: row.get("created_at"),
    }
}
