//! Chat management module.
//!
//! Personal and group conversations, participant membership and
//! invitations. The delivery pipeline consumes only `get_chat`,
//! `participants` and `delete_chat`; the rest backs the REST surface.

mod models;
mod repository;
mod service;

pub use models::{
    Chat, ChatDetail, ChatInvitation, ChatParticipant, ChatType, CreateGroupChatRequest,
    CreatePersonalChatRequest, InviteUsersRequest, RespondInvitationRequest,
};
pub use repository::ChatRepository;
pub use service::ChatService;
