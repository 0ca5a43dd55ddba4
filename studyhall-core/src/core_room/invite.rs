//! Direct invitations and shareable invite links

use super::types::{InviteId, InviteStatus, LinkId, RoomId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A direct, targeted invitation to join a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    /// Unique identifier
    pub id: InviteId,

    /// Target room
    pub room_id: RoomId,

    /// Who the invitation is addressed to
    pub invitee_id: UserId,

    /// Who sent it
    pub inviter_id: UserId,

    /// Lifecycle state; terminal once no longer Pending
    pub status: InviteStatus,

    /// When the invitation was created
    pub created_at: Timestamp,

    /// When a still-Pending invitation stops being acceptable
    pub expires_at: Timestamp,

    /// When the invitee responded (accept or decline)
    pub responded_at: Option<Timestamp>,
}

impl Invitation {
    /// Create a Pending invitation valid for `ttl`
    pub fn new(room_id: RoomId, invitee_id: UserId, inviter_id: UserId, ttl: Duration) -> Self {
        let now = Timestamp::now();
        Invitation {
            id: InviteId::generate(),
            room_id,
            invitee_id,
            inviter_id,
            status: InviteStatus::Pending,
            created_at: now,
            expires_at: now.plus(ttl),
            responded_at: None,
        }
    }

    /// Whether the invitation's acceptance window has passed
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Record acceptance
    pub fn mark_accepted(&mut self, now: Timestamp) {
        self.status = InviteStatus::Accepted;
        self.responded_at = Some(now);
    }

    /// Record a decline
    pub fn mark_declined(&mut self, now: Timestamp) {
        self.status = InviteStatus::Declined;
        self.responded_at = Some(now);
    }

    /// Retire an invitation that was never answered in time
    pub fn mark_expired(&mut self) {
        self.status = InviteStatus::Expired;
    }
}

/// A shareable, time-bounded join token; at most one active per room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteLink {
    /// Unique identifier
    pub id: LinkId,

    /// Target room
    pub room_id: RoomId,

    /// Unique redeemable code
    pub code: String,

    /// Authority who issued the link
    pub created_by: UserId,

    /// When the link stops being redeemable
    pub expires_at: Timestamp,

    /// False once superseded by a newer link
    pub is_active: bool,
}

impl InviteLink {
    /// Create an active link valid for `ttl`
    pub fn new(room_id: RoomId, code: String, created_by: UserId, ttl: Duration) -> Self {
        InviteLink {
            id: LinkId::generate(),
            room_id,
            code,
            created_by,
            expires_at: Timestamp::now().plus(ttl),
            is_active: true,
        }
    }

    /// Whether the link can still be redeemed
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.is_active && now < self.expires_at
    }
}
