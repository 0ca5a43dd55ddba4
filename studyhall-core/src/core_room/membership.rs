//! Membership data structure and role hierarchy rules

use super::types::{Role, RoomId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// A user's membership in a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    /// Room this membership belongs to
    pub room_id: RoomId,

    /// Member user
    pub user_id: UserId,

    /// Role in the room
    pub role: Role,

    /// Per-user favorite flag
    pub is_favorite: bool,

    /// Per-user mute flag for room notifications
    pub is_silenced: bool,

    /// When the member joined
    pub joined_at: Timestamp,
}

impl Membership {
    /// Membership created for a room's founding owner
    pub fn owner(room_id: RoomId, user_id: UserId) -> Self {
        Membership {
            room_id,
            user_id,
            role: Role::Owner,
            is_favorite: false,
            is_silenced: false,
            joined_at: Timestamp::now(),
        }
    }

    /// Membership created for a regular joiner
    pub fn member(room_id: RoomId, user_id: UserId) -> Self {
        Membership {
            room_id,
            user_id,
            role: Role::Member,
            is_favorite: false,
            is_silenced: false,
            joined_at: Timestamp::now(),
        }
    }

    /// Whether this member may review access requests and issue invite links
    pub fn is_authority(&self) -> bool {
        self.role.is_authority()
    }

    /// Whether this member may remove a member holding `target` role.
    ///
    /// Owners may remove anyone below them. Moderators may remove regular
    /// members only. Nobody removes the owner; the owner exits through
    /// succession or room deletion.
    pub fn may_kick(&self, target: Role) -> bool {
        match (self.role, target) {
            (_, Role::Owner) => false,
            (Role::Owner, _) => true,
            (Role::Moderator, Role::Member) => true,
            (Role::Moderator, Role::Moderator) => false,
            (Role::Member, _) => false,
        }
    }
}
