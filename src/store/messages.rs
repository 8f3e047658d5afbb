//! Conversation log: append-only question/answer records per space or chat.

use serde::Serialize;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use super::{StoreError, now_rfc3339};

/// Whether a message is a user question or a generated answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A user's raw query.
    Question,
    /// The generated answer that follows a question.
    Answer,
}

impl MessageKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Answer => "answer",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "answer" => Self::Answer,
            _ => Self::Question,
        }
    }
}

/// Which conversation a message belongs to, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContext {
    /// Message belongs to a shared space.
    Space(String),
    /// Message belongs to a private chat.
    Chat(String),
    /// Unassociated message from a context-less query.
    None,
}

/// A message to append to the log.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Conversation the message belongs to.
    pub context: MessageContext,
    /// Author, when the caller is known.
    pub user_id: Option<String>,
    /// Question or answer.
    pub kind: MessageKind,
    /// Message text.
    pub content: String,
}

/// A persisted conversation log record.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    /// Monotonic row id; breaks timestamp ties in insertion order.
    pub id: i64,
    /// Conversation the message belongs to.
    #[serde(skip_serializing)]
    pub context: MessageContext,
    /// Author, when the caller was known.
    pub user_id: Option<String>,
    /// Question or answer.
    pub kind: MessageKind,
    /// Message text.
    pub content: String,
    /// RFC3339 append timestamp.
    pub created_at: String,
}

/// Store handle for the append-only conversation log.
#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    /// Wrap a pool in a message store handle.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one message. Chat-bound appends also bump the chat's `last_message_at`.
    pub async fn append(&self, message: NewMessage) -> Result<Message, StoreError> {
        let created_at = now_rfc3339();
        let (space_id, chat_id) = match &message.context {
            MessageContext::Space(id) => (Some(id.as_str()), Option::<&str>::None),
            MessageContext::Chat(id) => (None, Some(id.as_str())),
            MessageContext::None => (None, None),
        };

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO messages (space_id, chat_id, user_id, kind, content, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(space_id)
        .bind(chat_id)
        .bind(&message.user_id)
        .bind(message.kind.as_str())
        .bind(&message.content)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        if let Some(chat_id) = chat_id {
            sqlx::query("UPDATE chats SET last_message_at = ? WHERE id = ?")
                .bind(&created_at)
                .bind(chat_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(Message {
            id: result.last_insert_rowid(),
            context: message.context,
            user_id: message.user_id,
            kind: message.kind,
            content: message.content,
            created_at,
        })
    }

    /// All messages for a space, oldest first; ties break in insertion order.
    pub async fn list_for_space(&self, space_id: &str) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE space_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(space_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    /// All messages for a chat, oldest first; ties break in insertion order.
    pub async fn list_for_chat(&self, chat_id: &str) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE chat_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }
}

fn message_from_row(row: &SqliteRow) -> Message {
    let kind: String = row.get("kind");
    let space_id: Option<String> = row.get("space_id");
    let chat_id: Option<String> = row.get("chat_id");
    let context = match (space_id, chat_id) {
        (Some(id), _) => MessageContext::Space(id),
        (None, Some(id)) => MessageContext::Chat(id),
        (None, None) => MessageContext::None,
    };

    Message {
        id: row.get("id"),
        context,
        user_id: row.get("user_id"),
        kind: MessageKind::parse(&kind),
        content: row.get("content"),
        created_at: row.get("created_at"),
    }
}
