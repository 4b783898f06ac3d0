//! Message repository for database operations.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::instrument;

use super::models::Message;

/// Repository for message persistence.
#[derive(Debug, Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    /// Create a new message repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn generate_id() -> String {
        format!("msg_{}", nanoid::nanoid!(12))
    }

    /// Persist a message, assigning its ID. Returns the assigned ID.
    #[instrument(skip(self, message), fields(chat_id = %message.chat_id))]
    pub async fn create(&self, message: &Message) -> Result<String> {
        let id = Self::generate_id();

        sqlx::query(
            r#"
            INSERT INTO messages (id, chat_id, sender_id, message, timestamp, is_read)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&message.chat_id)
        .bind(&message.sender_id)
        .bind(&message.message)
        .bind(message.timestamp)
        .bind(message.is_read)
        .execute(&self.pool)
        .await
        .context("Failed to insert message")?;

        Ok(id)
    }

    /// Get a message by ID.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(
            "SELECT id, chat_id, sender_id, message, timestamp, is_read FROM messages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch message")?;

        Ok(message)
    }

    /// Update a message's mutable fields.
    #[instrument(skip(self, message), fields(message_id = %message.id))]
    pub async fn update(&self, message: &Message) -> Result<()> {
        sqlx::query("UPDATE messages SET message = ?, is_read = ?, timestamp = ? WHERE id = ?")
            .bind(&message.message)
            .bind(message.is_read)
            .bind(message.timestamp)
            .bind(&message.id)
            .execute(&self.pool)
            .await
            .context("Failed to update message")?;

        Ok(())
    }

    /// Delete a message.
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete message")?;

        Ok(())
    }

    /// Page through a chat's history, newest first.
    #[instrument(skip(self))]
    pub async fn get_by_chat_id(
        &self,
        chat_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>> {
        let limit = if limit > 0 { limit } else { 50 };

        sqlx::query_as::<_, Message>(
            r#"
            SELECT id, chat_id, sender_id, message, timestamp, is_read
            FROM messages
            WHERE chat_id = ?
            ORDER BY timestamp DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(chat_id)
        .bind(limit)
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch chat messages")
    }
}
