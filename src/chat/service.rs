//! Chat service for business logic.
//!
//! Mirrors the membership rules enforced at the REST surface: participant
//! guards on reads, admin guards on destructive operations, invitation flow
//! for groups, and dedup of personal chats.

use anyhow::{Result, bail};
use tracing::{info, instrument};

use super::models::{Chat, ChatDetail, ChatInvitation, ChatType};
use super::repository::{ChatRepository, NewParticipant};
use crate::message::{Message, MessageRepository};
use crate::user::{UserInfo, UserRepository};

/// Service for chat management operations.
#[derive(Debug, Clone)]
pub struct ChatService {
    chats: ChatRepository,
    users: UserRepository,
    messages: MessageRepository,
}

impl ChatService {
    /// Create a new chat service.
    pub fn new(chats: ChatRepository, users: UserRepository, messages: MessageRepository) -> Self {
        Self {
            chats,
            users,
            messages,
        }
    }

    /// Get a chat by ID without membership checks; used by the delivery
    /// pipeline, which trusts the session's membership implicitly.
    pub async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>> {
        self.chats.get(chat_id).await
    }

    /// Active participant user IDs of a chat.
    pub async fn participant_ids(&self, chat_id: &str) -> Result<Vec<String>> {
        let participants = self.chats.get_participants(chat_id).await?;
        Ok(participants.into_iter().map(|p| p.user_id).collect())
    }

    /// Delete a chat unconditionally; delivery-path cleanup for empty chats.
    pub async fn delete_chat_unchecked(&self, chat_id: &str) -> Result<()> {
        self.chats.delete(chat_id).await
    }

    /// List a user's chats. Personal chats are renamed to the peer's display
    /// name so clients never see the placeholder.
    #[instrument(skip(self))]
    pub async fn index(&self, user_id: &str) -> Result<Vec<Chat>> {
        let mut chats = self.chats.index(user_id).await?;

        for chat in chats.iter_mut() {
            if chat.chat_type == ChatType::Personal {
                if let Some(name) = self.peer_name(&chat.id, user_id).await? {
                    chat.name = name;
                }
            }
        }

        Ok(chats)
    }

    /// Get a chat with its roster. Caller must be a participant.
    #[instrument(skip(self))]
    pub async fn get(&self, chat_id: &str, user_id: &str) -> Result<ChatDetail> {
        if !self.chats.is_participant(user_id, chat_id).await? {
            bail!("You are not a participant of this chat");
        }

        let mut chat = self
            .chats
            .get(chat_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Chat not found: {chat_id}"))?;

        let participants = self.roster(chat_id).await?;

        if chat.chat_type == ChatType::Personal {
            if let Some(peer) = participants.iter().find(|p| p.id != user_id) {
                chat.name = peer.name.clone();
            }
        }

        Ok(ChatDetail { chat, participants })
    }

    /// Delete a chat. Only the creator or an admin may delete.
    #[instrument(skip(self))]
    pub async fn delete(&self, chat_id: &str, user_id: &str) -> Result<()> {
        let chat = self
            .chats
            .get(chat_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Chat not found: {chat_id}"))?;

        if chat.created_by != user_id && !self.chats.is_admin(user_id, chat_id).await? {
            bail!("You are not an admin of this chat");
        }

        self.chats.delete(chat_id).await
    }

    /// Create a 1-on-1 chat, or return the existing one between the pair.
    #[instrument(skip(self))]
    pub async fn create_personal_chat(
        &self,
        user_id: &str,
        participant_id: &str,
    ) -> Result<String> {
        if self.users.get(participant_id).await?.is_none() {
            bail!("Participant not found: {participant_id}");
        }

        if let Some(existing) = self
            .chats
            .get_personal_chat_between(user_id, participant_id)
            .await?
        {
            return Ok(existing.id);
        }

        let chat = new_chat("Personal", ChatType::Personal, user_id, None);
        let chat_id = self.chats.create(&chat).await?;

        self.chats
            .add_participants(&[
                member(&chat_id, user_id),
                member(&chat_id, participant_id),
            ])
            .await?;

        info!(chat_id = %chat_id, "Created personal chat");
        Ok(chat_id)
    }

    /// Create a group chat. The creator joins as admin, everyone else as a
    /// member.
    #[instrument(skip(self, user_ids), fields(members = user_ids.len()))]
    pub async fn create_group_chat(
        &self,
        name: &str,
        description: Option<String>,
        creator_id: &str,
        user_ids: &[String],
    ) -> Result<String> {
        if name.is_empty() {
            bail!("Group name is required");
        }
        if user_ids.is_empty() {
            bail!("At least one participant is required");
        }

        let users = self.users.list(user_ids).await?;
        if users.len() != user_ids.len() {
            bail!("Some user IDs are invalid");
        }

        let chat = new_chat(name, ChatType::Group, creator_id, description);
        let chat_id = self.chats.create(&chat).await?;

        let mut participants = vec![NewParticipant {
            chat_id: chat_id.clone(),
            user_id: creator_id.to_string(),
            role: "admin".to_string(),
        }];
        for user_id in user_ids {
            if user_id != creator_id {
                participants.push(member(&chat_id, user_id));
            }
        }
        self.chats.add_participants(&participants).await?;

        info!(chat_id = %chat_id, name, "Created group chat");
        Ok(chat_id)
    }

    /// Invite users to a group. Admin only; personal chats reject invites;
    /// existing participants and already-invited users are skipped.
    #[instrument(skip(self, user_ids))]
    pub async fn invite_users(
        &self,
        chat_id: &str,
        inviter_id: &str,
        user_ids: &[String],
    ) -> Result<()> {
        let chat = self
            .chats
            .get(chat_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Chat not found: {chat_id}"))?;

        if chat.chat_type != ChatType::Group {
            bail!("Cannot invite users to a personal chat");
        }
        if !self.chats.is_participant(inviter_id, chat_id).await? {
            bail!("You are not a participant of this chat");
        }
        if !self.chats.is_admin(inviter_id, chat_id).await? {
            bail!("You are not an admin of this chat");
        }

        let users = self.users.list(user_ids).await?;
        if users.len() != user_ids.len() {
            bail!("Some user IDs are invalid");
        }

        for user_id in user_ids {
            if self.chats.is_participant(user_id, chat_id).await? {
                continue;
            }
            if self
                .chats
                .get_invitation_by_user_and_chat(user_id, chat_id)
                .await?
                .is_some()
            {
                continue;
            }
            self.chats
                .create_invitation(chat_id, inviter_id, user_id)
                .await?;
        }

        Ok(())
    }

    /// Leave a group chat.
    #[instrument(skip(self))]
    pub async fn leave_group(&self, chat_id: &str, user_id: &str) -> Result<()> {
        let chat = self
            .chats
            .get(chat_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Chat not found: {chat_id}"))?;

        if chat.chat_type != ChatType::Group {
            bail!("Cannot leave a personal chat");
        }
        if !self.chats.is_participant(user_id, chat_id).await? {
            bail!("You are not a participant of this chat");
        }

        self.chats.remove_participant(user_id, chat_id).await
    }

    /// Pending invitations addressed to a user.
    pub async fn pending_invitations(&self, user_id: &str) -> Result<Vec<ChatInvitation>> {
        self.chats.get_pending_invitations(user_id).await
    }

    /// Accept or reject an invitation. Accepting joins the chat as a member.
    #[instrument(skip(self))]
    pub async fn respond_to_invitation(
        &self,
        invitation_id: &str,
        user_id: &str,
        accept: bool,
    ) -> Result<()> {
        let invitation = self
            .chats
            .get_invitation(invitation_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Invitation not found: {invitation_id}"))?;

        if invitation.invitee_id != user_id {
            bail!("Invalid invitation");
        }
        if invitation.status != "pending" {
            bail!("Invitation has already been responded to");
        }

        let status = if accept { "accepted" } else { "rejected" };
        self.chats
            .update_invitation_status(invitation_id, status)
            .await?;

        if accept {
            self.chats
                .add_participants(&[member(&invitation.chat_id, user_id)])
                .await?;
        }

        Ok(())
    }

    /// Participant roster of a chat. Caller must be a participant.
    #[instrument(skip(self))]
    pub async fn participants(&self, chat_id: &str, user_id: &str) -> Result<Vec<UserInfo>> {
        if !self.chats.is_participant(user_id, chat_id).await? {
            bail!("You are not a participant of this chat");
        }
        self.roster(chat_id).await
    }

    /// Message history for a chat, newest first. Caller must be a participant.
    #[instrument(skip(self))]
    pub async fn messages(
        &self,
        chat_id: &str,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>> {
        if !self.chats.is_participant(user_id, chat_id).await? {
            bail!("You are not a participant of this chat");
        }
        self.messages.get_by_chat_id(chat_id, limit, offset).await
    }

    async fn roster(&self, chat_id: &str) -> Result<Vec<UserInfo>> {
        let user_ids = self.participant_ids(chat_id).await?;
        let users = self.users.list(&user_ids).await?;
        Ok(users.iter().map(|u| u.info()).collect())
    }

    /// Display name of the other participant in a personal chat.
    async fn peer_name(&self, chat_id: &str, user_id: &str) -> Result<Option<String>> {
        let participants = self.chats.get_participants(chat_id).await?;
        let Some(peer) = participants.iter().find(|p| p.user_id != user_id) else {
            return Ok(None);
        };
        Ok(self.users.get(&peer.user_id).await?.map(|u| u.name))
    }
}

fn new_chat(name: &str, chat_type: ChatType, created_by: &str, description: Option<String>) -> Chat {
    Chat {
        id: String::new(),
        name: name.to_string(),
        chat_type,
        created_by: created_by.to_string(),
        description,
        created_at: String::new(),
        updated_at: String::new(),
    }
}

fn member(chat_id: &str, user_id: &str) -> NewParticipant {
    NewParticipant {
        chat_id: chat_id.to_string(),
        user_id: user_id.to_string(),
        role: "member".to_string(),
    }
}
