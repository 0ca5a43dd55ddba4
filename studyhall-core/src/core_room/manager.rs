//! Manager traits for room, invitation, and access request operations

use super::error::RoomError;
use super::invite::{InviteLink, Invitation};
use super::membership::Membership;
use super::request::AccessRequest;
use super::room::Room;
use super::types::{InviteId, RequestId, RoomId, RoomVisibility, UserId};
use std::time::Duration;

/// How a leave resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// A moderator or regular member left
    MemberLeft,
    /// The owner left and ownership passed to another member
    OwnershipTransferred { new_owner: UserId },
    /// The owner was the last member; the room is closed for good
    RoomClosed,
}

/// Manager for room lifecycle and membership authority
pub trait RoomAuthority {
    /// Create a room; the creator becomes its Owner
    fn create_room(
        &mut self,
        creator: UserId,
        name: String,
        description: Option<String>,
        visibility: RoomVisibility,
    ) -> Result<Room, RoomError>;

    /// Get an active room by id
    fn get_room(&self, room_id: &RoomId) -> Result<Room, RoomError>;

    /// Active rooms the user belongs to, most recently active first
    fn list_rooms_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<(Room, Membership)>, RoomError>;

    /// List a room's members (members only), ordered by join time
    fn list_members(
        &self,
        actor: &UserId,
        room_id: &RoomId,
    ) -> Result<Vec<Membership>, RoomError>;

    /// Update room metadata (owner only); None leaves a field unchanged
    fn update_room(
        &mut self,
        actor: &UserId,
        room_id: &RoomId,
        name: Option<String>,
        description: Option<String>,
        visibility: Option<RoomVisibility>,
    ) -> Result<Room, RoomError>;

    /// Flip the caller's favorite flag on their own membership
    fn set_favorite(
        &mut self,
        user_id: &UserId,
        room_id: &RoomId,
        is_favorite: bool,
    ) -> Result<Membership, RoomError>;

    /// Flip the caller's silenced flag on their own membership
    fn set_silenced(
        &mut self,
        user_id: &UserId,
        room_id: &RoomId,
        is_silenced: bool,
    ) -> Result<Membership, RoomError>;

    /// Join a room; idempotent for existing members
    fn join_room(&mut self, user_id: UserId, room_id: &RoomId) -> Result<Membership, RoomError>;

    /// Leave a room; an owner's leave runs succession
    fn leave_room(&mut self, user_id: &UserId, room_id: &RoomId)
        -> Result<LeaveOutcome, RoomError>;

    /// Raise a member to moderator (owner only)
    fn promote(
        &mut self,
        actor: &UserId,
        room_id: &RoomId,
        target: &UserId,
    ) -> Result<Membership, RoomError>;

    /// Return a moderator to regular membership (owner only)
    fn demote(
        &mut self,
        actor: &UserId,
        room_id: &RoomId,
        target: &UserId,
    ) -> Result<Membership, RoomError>;

    /// Remove a member (owner or moderator, within the hierarchy)
    fn kick(&mut self, actor: &UserId, room_id: &RoomId, target: &UserId)
        -> Result<(), RoomError>;

    /// Hard-delete a room and everything that references it (owner only)
    fn delete_room(&mut self, actor: &UserId, room_id: &RoomId) -> Result<(), RoomError>;
}

/// Manager for direct invitations and shareable invite links
pub trait InvitationWorkflow {
    /// Invite a user to a room (any member may invite)
    fn send_invite(
        &mut self,
        sender: UserId,
        room_id: &RoomId,
        invitee: UserId,
    ) -> Result<Invitation, RoomError>;

    /// Invitations issued for a room, newest first (members only)
    fn list_room_invites(
        &self,
        actor: &UserId,
        room_id: &RoomId,
    ) -> Result<Vec<Invitation>, RoomError>;

    /// The caller's own live pending invitations
    fn list_user_invites(&self, user_id: &UserId) -> Result<Vec<Invitation>, RoomError>;

    /// Withdraw a pending invitation (members only)
    fn revoke_invite(
        &mut self,
        actor: &UserId,
        room_id: &RoomId,
        invite_id: &InviteId,
    ) -> Result<(), RoomError>;

    /// Accept a pending invitation addressed to the caller and join the room
    fn accept_invite(
        &mut self,
        user_id: &UserId,
        invite_id: &InviteId,
    ) -> Result<Membership, RoomError>;

    /// Decline a pending invitation addressed to the caller
    fn reject_invite(&mut self, user_id: &UserId, invite_id: &InviteId) -> Result<(), RoomError>;

    /// Issue a fresh invite link, retiring the room's current one
    /// (owner or moderator); None falls back to the configured TTL
    fn create_invite_link(
        &mut self,
        actor: &UserId,
        room_id: &RoomId,
        ttl: Option<Duration>,
    ) -> Result<InviteLink, RoomError>;

    /// The room's active, unexpired link (members only)
    fn get_active_invite_link(
        &self,
        actor: &UserId,
        room_id: &RoomId,
    ) -> Result<InviteLink, RoomError>;

    /// Join a room through a live invite link code
    fn redeem_invite_link(
        &mut self,
        user_id: UserId,
        code: &str,
    ) -> Result<Membership, RoomError>;
}

/// Manager for access requests to gated rooms
pub trait AccessRequestWorkflow {
    /// Petition to join a room the caller cannot enter directly
    fn request_access(
        &mut self,
        user_id: UserId,
        room_id: &RoomId,
        message: Option<String>,
    ) -> Result<AccessRequest, RoomError>;

    /// Pending requests for a room, oldest first (owner or moderator)
    fn list_access_requests(
        &self,
        actor: &UserId,
        room_id: &RoomId,
    ) -> Result<Vec<AccessRequest>, RoomError>;

    /// Approve a pending request and admit the requester (owner or moderator)
    fn approve_access_request(
        &mut self,
        actor: &UserId,
        room_id: &RoomId,
        request_id: &RequestId,
    ) -> Result<AccessRequest, RoomError>;

    /// Turn down a pending request (owner or moderator)
    fn reject_access_request(
        &mut self,
        actor: &UserId,
        room_id: &RoomId,
        request_id: &RequestId,
    ) -> Result<AccessRequest, RoomError>;
}
