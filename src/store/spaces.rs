//! Spaces: shared collaboration contexts bound to one document.

use serde::Serialize;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::{StoreError, now_rfc3339};

/// A multi-user collaboration context around one document.
#[derive(Debug, Clone, Serialize)]
pub struct Space {
    /// Space identifier (UUID).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// The document this space is bound to.
    pub document_id: String,
    /// Opaque capability token; redeeming it grants membership.
    #[serde(skip_serializing)]
    pub access_token: String,
    /// User who created the space.
    pub created_by: String,
    /// RFC3339 creation timestamp.
    pub created_at: String,
}

/// Store handle for spaces and their member sets.
#[derive(Clone)]
pub struct SpaceStore {
    pool: SqlitePool,
}

impl SpaceStore {
    /// Wrap a pool in a space store handle.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a space with a fresh access token; the creator becomes the first member.
    pub async fn create(
        &self,
        name: &str,
        description: &str,
        document_id: &str,
        created_by: &str,
    ) -> Result<Space, StoreError> {
        let space = Space {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            document_id: document_id.to_string(),
            access_token: Uuid::new_v4().to_string(),
            created_by: created_by.to_string(),
            created_at: now_rfc3339(),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO spaces (id, name, description, document_id, access_token, created_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&space.id)
        .bind(&space.name)
        .bind(&space.description)
        .bind(&space.document_id)
        .bind(&space.access_token)
        .bind(&space.created_by)
        .bind(&space.created_at)
        .execute(&mut *tx)
        .await?;
        sqlx::query("INSERT INTO space_members (space_id, user_id) VALUES (?, ?)")
            .bind(&space.id)
            .bind(created_by)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(space)
    }

    /// Fetch one space by id.
    pub async fn get(&self, id: &str) -> Result<Option<Space>, StoreError> {
        let row = sqlx::query("SELECT * FROM spaces WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| space_from_row(&row)))
    }

    /// Fetch the space a token belongs to, if any.
    pub async fn find_by_token(&self, access_token: &str) -> Result<Option<Space>, StoreError> {
        let row = sqlx::query("SELECT * FROM spaces WHERE access_token = ?")
            .bind(access_token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| space_from_row(&row)))
    }

    /// Add a user to a space's member set. Idempotent: re-adding is a no-op.
    ///
    /// Returns `true` when the membership was newly created.
    pub async fn add_member(&self, space_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO space_members (space_id, user_id) VALUES (?, ?)")
                .bind(space_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List the member set of a space.
    pub async fn members(&self, space_id: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT user_id FROM space_members WHERE space_id = ? ORDER BY user_id")
            .bind(space_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("user_id")).collect())
    }

    /// List every space the user is a member of, newest first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Space>, StoreError> {
        let rows = sqlx::query(
            "SELECT s.* FROM spaces s
             JOIN space_members m ON m.space_id = s.id
             WHERE m.user_id = ?
             ORDER BY s.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(space_from_row).collect())
    }
}

fn space_from_row(row: &SqliteRow) -> Space {
    Space {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        document_id: row.get("document_id"),
        access_token: row.get("access_token"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
    }
}
