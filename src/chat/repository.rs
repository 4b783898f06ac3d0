//! Chat repository for database operations.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::instrument;

use super::models::{Chat, ChatInvitation, ChatParticipant};

const CHAT_COLUMNS: &str =
    "id, name, chat_type, created_by, description, created_at, updated_at";
const PARTICIPANT_COLUMNS: &str = "id, chat_id, user_id, role, joined_at, is_active";
const INVITATION_COLUMNS: &str =
    "id, chat_id, inviter_id, invitee_id, status, created_at, responded_at";

/// Participant row to insert; IDs and timestamps are assigned here.
#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub chat_id: String,
    pub user_id: String,
    pub role: String,
}

/// Repository for chat, participant and invitation operations.
#[derive(Debug, Clone)]
pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    /// Create a new chat repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn generate_id(prefix: &str) -> String {
        format!("{}_{}", prefix, nanoid::nanoid!(12))
    }

    /// List all chats a user actively participates in, most recent first.
    #[instrument(skip(self))]
    pub async fn index(&self, user_id: &str) -> Result<Vec<Chat>> {
        sqlx::query_as::<_, Chat>(&format!(
            r#"
            SELECT c.{}
            FROM chats c
            JOIN chat_participants p ON p.chat_id = c.id
            WHERE p.user_id = ? AND p.is_active = 1
            ORDER BY c.updated_at DESC
            "#,
            CHAT_COLUMNS.replace(", ", ", c.")
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list chats for user")
    }

    /// Get a chat by ID.
    #[instrument(skip(self))]
    pub async fn get(&self, chat_id: &str) -> Result<Option<Chat>> {
        sqlx::query_as::<_, Chat>(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?"
        ))
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch chat")
    }

    /// Create a chat, assigning its ID.
    #[instrument(skip(self, chat), fields(name = %chat.name))]
    pub async fn create(&self, chat: &Chat) -> Result<String> {
        let id = Self::generate_id("cht");

        sqlx::query(
            r#"
            INSERT INTO chats (id, name, chat_type, created_by, description)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&chat.name)
        .bind(chat.chat_type.to_string())
        .bind(&chat.created_by)
        .bind(&chat.description)
        .execute(&self.pool)
        .await
        .context("Failed to insert chat")?;

        Ok(id)
    }

    /// Delete a chat; participants and invitations cascade.
    #[instrument(skip(self))]
    pub async fn delete(&self, chat_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete chat")?;

        Ok(())
    }

    /// Add participants to a chat.
    #[instrument(skip(self, participants))]
    pub async fn add_participants(&self, participants: &[NewParticipant]) -> Result<()> {
        for participant in participants {
            sqlx::query(
                r#"
                INSERT INTO chat_participants (id, chat_id, user_id, role)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(Self::generate_id("ptc"))
            .bind(&participant.chat_id)
            .bind(&participant.user_id)
            .bind(&participant.role)
            .execute(&self.pool)
            .await
            .context("Failed to insert participant")?;
        }

        Ok(())
    }

    /// All active participants of a chat.
    #[instrument(skip(self))]
    pub async fn get_participants(&self, chat_id: &str) -> Result<Vec<ChatParticipant>> {
        sqlx::query_as::<_, ChatParticipant>(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM chat_participants WHERE chat_id = ? AND is_active = 1"
        ))
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch participants")
    }

    /// Check active membership.
    pub async fn is_participant(&self, user_id: &str, chat_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chat_participants WHERE user_id = ? AND chat_id = ? AND is_active = 1",
        )
        .bind(user_id)
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check participant")?;

        Ok(count > 0)
    }

    /// Check admin membership.
    pub async fn is_admin(&self, user_id: &str, chat_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM chat_participants
            WHERE user_id = ? AND chat_id = ? AND is_active = 1 AND role = 'admin'
            "#,
        )
        .bind(user_id)
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check admin")?;

        Ok(count > 0)
    }

    /// Soft-remove a participant.
    #[instrument(skip(self))]
    pub async fn remove_participant(&self, user_id: &str, chat_id: &str) -> Result<()> {
        sqlx::query("UPDATE chat_participants SET is_active = 0 WHERE user_id = ? AND chat_id = ?")
            .bind(user_id)
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .context("Failed to remove participant")?;

        Ok(())
    }

    /// Find an existing personal chat shared by two users.
    #[instrument(skip(self))]
    pub async fn get_personal_chat_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Option<Chat>> {
        sqlx::query_as::<_, Chat>(&format!(
            r#"
            SELECT {CHAT_COLUMNS} FROM chats
            WHERE chat_type = 'personal'
              AND EXISTS (
                SELECT 1 FROM chat_participants
                WHERE chat_id = chats.id AND user_id = ?
              )
              AND EXISTS (
                SELECT 1 FROM chat_participants
                WHERE chat_id = chats.id AND user_id = ?
              )
            LIMIT 1
            "#
        ))
        .bind(user_a)
        .bind(user_b)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up personal chat")
    }

    /// Create a pending invitation, assigning its ID.
    #[instrument(skip(self))]
    pub async fn create_invitation(
        &self,
        chat_id: &str,
        inviter_id: &str,
        invitee_id: &str,
    ) -> Result<String> {
        let id = Self::generate_id("inv");

        sqlx::query(
            r#"
            INSERT INTO chat_invitations (id, chat_id, inviter_id, invitee_id, status)
            VALUES (?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(&id)
        .bind(chat_id)
        .bind(inviter_id)
        .bind(invitee_id)
        .execute(&self.pool)
        .await
        .context("Failed to insert invitation")?;

        Ok(id)
    }

    /// Get an invitation by ID.
    pub async fn get_invitation(&self, invitation_id: &str) -> Result<Option<ChatInvitation>> {
        sqlx::query_as::<_, ChatInvitation>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM chat_invitations WHERE id = ?"
        ))
        .bind(invitation_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch invitation")
    }

    /// All pending invitations addressed to a user.
    #[instrument(skip(self))]
    pub async fn get_pending_invitations(&self, user_id: &str) -> Result<Vec<ChatInvitation>> {
        sqlx::query_as::<_, ChatInvitation>(&format!(
            r#"
            SELECT {INVITATION_COLUMNS} FROM chat_invitations
            WHERE invitee_id = ? AND status = 'pending'
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch pending invitations")
    }

    /// Find a pending invitation for a user in a chat.
    pub async fn get_invitation_by_user_and_chat(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> Result<Option<ChatInvitation>> {
        sqlx::query_as::<_, ChatInvitation>(&format!(
            r#"
            SELECT {INVITATION_COLUMNS} FROM chat_invitations
            WHERE invitee_id = ? AND chat_id = ? AND status = 'pending'
            "#
        ))
        .bind(user_id)
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch invitation by user and chat")
    }

    /// Resolve an invitation.
    #[instrument(skip(self))]
    pub async fn update_invitation_status(&self, invitation_id: &str, status: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE chat_invitations
            SET status = ?, responded_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(invitation_id)
        .execute(&self.pool)
        .await
        .context("Failed to update invitation status")?;

        Ok(())
    }
}
