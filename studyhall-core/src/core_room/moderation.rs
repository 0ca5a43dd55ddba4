//! Append-only moderation audit trail

use super::types::{EntryId, ModerationAction, RoomId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// One audited moderation action. Entries are never updated or deleted
/// individually; only the room-delete cascade removes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationEntry {
    /// Unique identifier
    pub id: EntryId,

    /// Room the action happened in
    pub room_id: RoomId,

    /// Authority who acted
    pub moderator_id: UserId,

    /// Member the action was applied to
    pub target_user_id: UserId,

    /// What happened
    pub action: ModerationAction,

    /// When it happened
    pub created_at: Timestamp,
}

impl ModerationEntry {
    pub fn new(
        room_id: RoomId,
        moderator_id: UserId,
        target_user_id: UserId,
        action: ModerationAction,
    ) -> Self {
        ModerationEntry {
            id: EntryId::generate(),
            room_id,
            moderator_id,
            target_user_id,
            action,
            created_at: Timestamp::now(),
        }
    }
}
