//! Room data structure

use super::types::{ConversationId, RoomId, RoomVisibility, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Bounds for a room name
pub const NAME_MIN_LEN: usize = 3;
pub const NAME_MAX_LEN: usize = 50;

/// Upper bound for a room description
pub const DESCRIPTION_MAX_LEN: usize = 200;

/// A Room is a named study group with one owner and a bound chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    /// Unique identifier
    pub id: RoomId,

    /// Human-readable name (3-50 chars)
    pub name: String,

    /// Optional description (up to 200 chars)
    pub description: Option<String>,

    /// Visibility mode (public or private)
    pub visibility: RoomVisibility,

    /// Short unique join code
    pub code: String,

    /// Current owner (exactly one while the room is active)
    pub owner_id: UserId,

    /// Chat conversation bound 1:1 to this room
    pub conversation_id: ConversationId,

    /// Member count, kept in step with the memberships table on every
    /// mutating transaction
    pub current_members: u32,

    /// False once the room is closed; closed rooms never come back
    pub is_active: bool,

    /// When the room was created
    pub created_at: Timestamp,

    /// Last successful mutating operation on the room
    pub last_activity: Timestamp,
}

impl Room {
    /// Create a new active Room owned by `owner_id`
    pub fn new(
        name: String,
        description: Option<String>,
        visibility: RoomVisibility,
        code: String,
        owner_id: UserId,
        conversation_id: ConversationId,
    ) -> Self {
        let now = Timestamp::now();
        Room {
            id: RoomId::generate(),
            name,
            description,
            visibility,
            code,
            owner_id,
            conversation_id,
            current_members: 0,
            is_active: true,
            created_at: now,
            last_activity: now,
        }
    }

    /// Record activity on the room
    pub fn touch(&mut self) {
        self.last_activity = Timestamp::now();
    }
}
