//! Room Events
//!
//! Events emitted by the room manager after a lifecycle operation commits,
//! for consumption by presence, push, and UI layers.

use crate::core_room::{InviteId, RequestId, RoomId, UserId};
use serde::{Deserialize, Serialize};

/// Room lifecycle event
///
/// Every event carries the room it concerns. Delivery is best effort and
/// at most once; consumers must treat the store as the source of truth and
/// events as hints to refresh.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RoomEvent {
    /// A user became a member of the room
    MemberJoined { room_id: RoomId, user_id: UserId },

    /// A member left the room voluntarily
    MemberLeft { room_id: RoomId, user_id: UserId },

    /// Ownership passed to another member
    OwnershipTransferred {
        room_id: RoomId,
        previous_owner: UserId,
        new_owner: UserId,
    },

    /// A member was raised to moderator
    MemberPromoted {
        room_id: RoomId,
        user_id: UserId,
        promoted_by: UserId,
    },

    /// A moderator was returned to regular membership
    MemberDemoted {
        room_id: RoomId,
        user_id: UserId,
        demoted_by: UserId,
    },

    /// A member was removed by an authority
    MemberKicked {
        room_id: RoomId,
        user_id: UserId,
        kicked_by: UserId,
    },

    /// A direct invitation was issued to a user
    InviteReceived {
        room_id: RoomId,
        invite_id: InviteId,
        inviter_id: UserId,
    },

    /// A pending invitation was withdrawn by its sender
    InviteRevoked {
        room_id: RoomId,
        invite_id: InviteId,
    },

    /// The invitee accepted and joined
    InviteAccepted {
        room_id: RoomId,
        invite_id: InviteId,
        invitee_id: UserId,
    },

    /// The invitee declined
    InviteDeclined {
        room_id: RoomId,
        invite_id: InviteId,
        invitee_id: UserId,
    },

    /// A non-member asked to join a private room
    AccessRequested {
        room_id: RoomId,
        request_id: RequestId,
        user_id: UserId,
    },

    /// An access request was approved and the requester joined
    AccessApproved {
        room_id: RoomId,
        request_id: RequestId,
    },

    /// An access request was turned down
    AccessRejected {
        room_id: RoomId,
        request_id: RequestId,
    },

    /// The room and everything in it was deleted
    RoomDeleted { room_id: RoomId },

    /// The recipient's own membership ended because the room was deleted
    RemovedFromRoom { room_id: RoomId },
}

impl RoomEvent {
    /// Get the room this event concerns
    pub fn room_id(&self) -> &RoomId {
        match self {
            RoomEvent::MemberJoined { room_id, .. } => room_id,
            RoomEvent::MemberLeft { room_id, .. } => room_id,
            RoomEvent::OwnershipTransferred { room_id, .. } => room_id,
            RoomEvent::MemberPromoted { room_id, .. } => room_id,
            RoomEvent::MemberDemoted { room_id, .. } => room_id,
            RoomEvent::MemberKicked { room_id, .. } => room_id,
            RoomEvent::InviteReceived { room_id, .. } => room_id,
            RoomEvent::InviteRevoked { room_id, .. } => room_id,
            RoomEvent::InviteAccepted { room_id, .. } => room_id,
            RoomEvent::InviteDeclined { room_id, .. } => room_id,
            RoomEvent::AccessRequested { room_id, .. } => room_id,
            RoomEvent::AccessApproved { room_id, .. } => room_id,
            RoomEvent::AccessRejected { room_id, .. } => room_id,
            RoomEvent::RoomDeleted { room_id } => room_id,
            RoomEvent::RemovedFromRoom { room_id } => room_id,
        }
    }

    /// Stable name for logging and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            RoomEvent::MemberJoined { .. } => "member_joined",
            RoomEvent::MemberLeft { .. } => "member_left",
            RoomEvent::OwnershipTransferred { .. } => "ownership_transferred",
            RoomEvent::MemberPromoted { .. } => "member_promoted",
            RoomEvent::MemberDemoted { .. } => "member_demoted",
            RoomEvent::MemberKicked { .. } => "member_kicked",
            RoomEvent::InviteReceived { .. } => "invite_received",
            RoomEvent::InviteRevoked { .. } => "invite_revoked",
            RoomEvent::InviteAccepted { .. } => "invite_accepted",
            RoomEvent::InviteDeclined { .. } => "invite_declined",
            RoomEvent::AccessRequested { .. } => "access_requested",
            RoomEvent::AccessApproved { .. } => "access_approved",
            RoomEvent::AccessRejected { .. } => "access_rejected",
            RoomEvent::RoomDeleted { .. } => "room_deleted",
            RoomEvent::RemovedFromRoom { .. } => "removed_from_room",
        }
    }

    /// Get the invitation this event concerns (if any)
    pub fn invite_id(&self) -> Option<&InviteId> {
        match self {
            RoomEvent::InviteReceived { invite_id, .. } => Some(invite_id),
            RoomEvent::InviteRevoked { invite_id, .. } => Some(invite_id),
            RoomEvent::InviteAccepted { invite_id, .. } => Some(invite_id),
            RoomEvent::InviteDeclined { invite_id, .. } => Some(invite_id),
            _ => None,
        }
    }
}
