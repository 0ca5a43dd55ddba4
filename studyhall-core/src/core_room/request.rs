//! Access requests: the self-initiated path into a gated room

use super::types::{RequestId, RequestStatus, RoomId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// A user's petition to join a room, reviewed by an owner or moderator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Unique identifier
    pub id: RequestId,

    /// Room the requester wants to join
    pub room_id: RoomId,

    /// Requesting user
    pub user_id: UserId,

    /// Optional note to the reviewers
    pub message: Option<String>,

    /// Lifecycle state; terminal once reviewed
    pub status: RequestStatus,

    /// Authority who resolved the request
    pub reviewed_by: Option<UserId>,

    /// When the request was resolved
    pub reviewed_at: Option<Timestamp>,

    /// When the request was filed
    pub created_at: Timestamp,
}

impl AccessRequest {
    /// Create a Pending request
    pub fn new(room_id: RoomId, user_id: UserId, message: Option<String>) -> Self {
        AccessRequest {
            id: RequestId::generate(),
            room_id,
            user_id,
            message,
            status: RequestStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            created_at: Timestamp::now(),
        }
    }

    /// Record approval by `reviewer`
    pub fn approve(&mut self, reviewer: UserId, now: Timestamp) {
        self.status = RequestStatus::Approved;
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(now);
    }

    /// Record rejection by `reviewer`
    pub fn reject(&mut self, reviewer: UserId, now: Timestamp) {
        self.status = RequestStatus::Rejected;
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(now);
    }
}
