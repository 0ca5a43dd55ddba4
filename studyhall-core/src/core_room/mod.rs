//! Room Membership & Authority
//!
//! This module provides the core data structures and operations for study
//! rooms: membership, moderation roles, invitations, invite links, and
//! access requests.
//!
//! ## Architecture
//!
//! - **Room**: A named group bound 1:1 to a conversation
//! - **Membership**: One row per (room, user) carrying the role and flags
//! - **Invitation / InviteLink / AccessRequest**: The three admission paths
//! - One SQLite transaction per mutating operation; notifications after commit
//!
//! ## Key Design Principles
//!
//! 1. Exactly one Owner per active room, enforced by succession on leave
//! 2. Closed rooms (`is_active = false`) are terminal and invisible
//! 3. Direct joins are gated on friendship with the owner, whatever the
//!    room's visibility; invitations and links bypass the gate
//! 4. Member counts are recomputed inside the transaction, never patched

pub mod async_manager;
pub mod codes;
pub mod conversation;
pub mod error;
pub mod friendship;
pub mod invite;
pub mod manager;
pub mod manager_impl;
pub mod membership;
pub mod moderation;
pub mod request;
pub mod room;
pub mod storage;
pub mod types;

pub use async_manager::AsyncRoomManager;
pub use codes::{JoinCodeGenerator, LINK_CODE_LEN, ROOM_CODE_LEN};
pub use conversation::{ConversationBinder, InMemoryConversations};
pub use error::RoomError;
pub use friendship::{FriendshipOracle, InMemoryFriendGraph};
pub use invite::{InviteLink, Invitation};
pub use manager::{AccessRequestWorkflow, InvitationWorkflow, LeaveOutcome, RoomAuthority};
pub use manager_impl::{ManagerSettings, RoomManagerImpl, DEFAULT_INVITE_TTL, DEFAULT_LINK_TTL};
pub use membership::Membership;
pub use moderation::ModerationEntry;
pub use request::AccessRequest;
pub use room::{Room, DESCRIPTION_MAX_LEN, NAME_MAX_LEN, NAME_MIN_LEN};
pub use storage::{migrate, RoomSqlStore, CURRENT_ROOM_SCHEMA_VERSION};
pub use types::{
    ConversationId, EntryId, InviteId, InviteStatus, LinkId, ModerationAction, RequestId,
    RequestStatus, Role, RoomId, RoomVisibility, Timestamp, UserId,
};
