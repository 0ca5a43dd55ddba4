//! Async facade over the synchronous room manager
//!
//! Wraps [`RoomManagerImpl`] behind a tokio `RwLock` so concurrent tasks can
//! share one manager: reads take the shared lock, mutations the exclusive one.

use super::conversation::ConversationBinder;
use super::error::RoomError;
use super::friendship::FriendshipOracle;
use super::invite::{InviteLink, Invitation};
use super::manager::{
    AccessRequestWorkflow, InvitationWorkflow, LeaveOutcome, RoomAuthority,
};
use super::manager_impl::{ManagerSettings, RoomManagerImpl};
use super::membership::Membership;
use super::request::AccessRequest;
use super::room::Room;
use super::storage::RoomSqlStore;
use super::types::{InviteId, RequestId, RoomId, RoomVisibility, UserId};
use crate::core_notify::EventNotifier;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Async room manager shared across tasks
pub struct AsyncRoomManager {
    /// Synchronous manager for database operations
    manager: Arc<RwLock<RoomManagerImpl>>,
}

impl AsyncRoomManager {
    /// Create a new async manager with default settings
    pub fn new(
        store: RoomSqlStore,
        notifier: Arc<dyn EventNotifier>,
        conversations: Arc<dyn ConversationBinder>,
        friendships: Arc<dyn FriendshipOracle>,
    ) -> Self {
        Self {
            manager: Arc::new(RwLock::new(RoomManagerImpl::new(
                store,
                notifier,
                conversations,
                friendships,
            ))),
        }
    }

    /// Create a new async manager with explicit settings
    pub fn with_settings(
        store: RoomSqlStore,
        notifier: Arc<dyn EventNotifier>,
        conversations: Arc<dyn ConversationBinder>,
        friendships: Arc<dyn FriendshipOracle>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            manager: Arc::new(RwLock::new(RoomManagerImpl::with_settings(
                store,
                notifier,
                conversations,
                friendships,
                settings,
            ))),
        }
    }

    /// Create a new room owned by the creator
    pub async fn create_room(
        &self,
        creator: UserId,
        name: String,
        description: Option<String>,
        visibility: RoomVisibility,
    ) -> Result<Room, RoomError> {
        let mut manager = self.manager.write().await;
        manager.create_room(creator, name, description, visibility)
    }

    /// Get an active room by id
    pub async fn get_room(&self, room_id: &RoomId) -> Result<Room, RoomError> {
        let manager = self.manager.read().await;
        manager.get_room(room_id)
    }

    /// List the active rooms a user belongs to
    pub async fn list_rooms_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<(Room, Membership)>, RoomError> {
        let manager = self.manager.read().await;
        manager.list_rooms_for_user(user_id)
    }

    /// List a room's members (members only)
    pub async fn list_members(
        &self,
        actor: &UserId,
        room_id: &RoomId,
    ) -> Result<Vec<Membership>, RoomError> {
        let manager = self.manager.read().await;
        manager.list_members(actor, room_id)
    }

    /// Update room metadata (owner only)
    pub async fn update_room(
        &self,
        actor: &UserId,
        room_id: &RoomId,
        name: Option<String>,
        description: Option<String>,
        visibility: Option<RoomVisibility>,
    ) -> Result<Room, RoomError> {
        let mut manager = self.manager.write().await;
        manager.update_room(actor, room_id, name, description, visibility)
    }

    /// Flip the caller's favorite flag for a room
    pub async fn set_favorite(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        is_favorite: bool,
    ) -> Result<Membership, RoomError> {
        let mut manager = self.manager.write().await;
        manager.set_favorite(user_id, room_id, is_favorite)
    }

    /// Flip the caller's silenced flag for a room
    pub async fn set_silenced(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        is_silenced: bool,
    ) -> Result<Membership, RoomError> {
        let mut manager = self.manager.write().await;
        manager.set_silenced(user_id, room_id, is_silenced)
    }

    /// Join a room directly (gated on friendship with the owner)
    pub async fn join_room(
        &self,
        user_id: UserId,
        room_id: &RoomId,
    ) -> Result<Membership, RoomError> {
        let mut manager = self.manager.write().await;
        manager.join_room(user_id, room_id)
    }

    /// Leave a room, settling ownership succession if the owner leaves
    pub async fn leave_room(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
    ) -> Result<LeaveOutcome, RoomError> {
        let mut manager = self.manager.write().await;
        manager.leave_room(user_id, room_id)
    }

    /// Promote a member to moderator (owner only)
    pub async fn promote(
        &self,
        actor: &UserId,
        room_id: &RoomId,
        target: &UserId,
    ) -> Result<Membership, RoomError> {
        let mut manager = self.manager.write().await;
        manager.promote(actor, room_id, target)
    }

    /// Demote a moderator back to member (owner only)
    pub async fn demote(
        &self,
        actor: &UserId,
        room_id: &RoomId,
        target: &UserId,
    ) -> Result<Membership, RoomError> {
        let mut manager = self.manager.write().await;
        manager.demote(actor, room_id, target)
    }

    /// Kick a member below the actor's rank
    pub async fn kick(
        &self,
        actor: &UserId,
        room_id: &RoomId,
        target: &UserId,
    ) -> Result<(), RoomError> {
        let mut manager = self.manager.write().await;
        manager.kick(actor, room_id, target)
    }

    /// Hard-delete a room and everything hanging off it (owner only)
    pub async fn delete_room(&self, actor: &UserId, room_id: &RoomId) -> Result<(), RoomError> {
        let mut manager = self.manager.write().await;
        manager.delete_room(actor, room_id)
    }

    /// Send a direct invitation to a user
    pub async fn send_invite(
        &self,
        sender: UserId,
        room_id: &RoomId,
        invitee: UserId,
    ) -> Result<Invitation, RoomError> {
        let mut manager = self.manager.write().await;
        manager.send_invite(sender, room_id, invitee)
    }

    /// List a room's invitations (members only)
    pub async fn list_room_invites(
        &self,
        actor: &UserId,
        room_id: &RoomId,
    ) -> Result<Vec<Invitation>, RoomError> {
        let manager = self.manager.read().await;
        manager.list_room_invites(actor, room_id)
    }

    /// List a user's live pending invitations
    pub async fn list_user_invites(&self, user_id: &UserId) -> Result<Vec<Invitation>, RoomError> {
        let manager = self.manager.read().await;
        manager.list_user_invites(user_id)
    }

    /// Revoke a pending invitation (members only)
    pub async fn revoke_invite(
        &self,
        actor: &UserId,
        room_id: &RoomId,
        invite_id: &InviteId,
    ) -> Result<(), RoomError> {
        let mut manager = self.manager.write().await;
        manager.revoke_invite(actor, room_id, invite_id)
    }

    /// Accept an invitation addressed to the caller
    pub async fn accept_invite(
        &self,
        user_id: &UserId,
        invite_id: &InviteId,
    ) -> Result<Membership, RoomError> {
        let mut manager = self.manager.write().await;
        manager.accept_invite(user_id, invite_id)
    }

    /// Decline an invitation addressed to the caller
    pub async fn reject_invite(
        &self,
        user_id: &UserId,
        invite_id: &InviteId,
    ) -> Result<(), RoomError> {
        let mut manager = self.manager.write().await;
        manager.reject_invite(user_id, invite_id)
    }

    /// Rotate the room's shareable invite link (owner or moderator)
    pub async fn create_invite_link(
        &self,
        actor: &UserId,
        room_id: &RoomId,
        ttl: Option<Duration>,
    ) -> Result<InviteLink, RoomError> {
        let mut manager = self.manager.write().await;
        manager.create_invite_link(actor, room_id, ttl)
    }

    /// Get the room's live invite link (members only)
    pub async fn get_active_invite_link(
        &self,
        actor: &UserId,
        room_id: &RoomId,
    ) -> Result<InviteLink, RoomError> {
        let manager = self.manager.read().await;
        manager.get_active_invite_link(actor, room_id)
    }

    /// Join a room by redeeming a live invite link code
    pub async fn redeem_invite_link(
        &self,
        user_id: UserId,
        code: &str,
    ) -> Result<Membership, RoomError> {
        let mut manager = self.manager.write().await;
        manager.redeem_invite_link(user_id, code)
    }

    /// Ask the room's authorities for entry
    pub async fn request_access(
        &self,
        user_id: UserId,
        room_id: &RoomId,
        message: Option<String>,
    ) -> Result<AccessRequest, RoomError> {
        let mut manager = self.manager.write().await;
        manager.request_access(user_id, room_id, message)
    }

    /// List a room's pending access requests (owner or moderator)
    pub async fn list_access_requests(
        &self,
        actor: &UserId,
        room_id: &RoomId,
    ) -> Result<Vec<AccessRequest>, RoomError> {
        let manager = self.manager.read().await;
        manager.list_access_requests(actor, room_id)
    }

    /// Approve a pending access request, admitting the requester
    pub async fn approve_access_request(
        &self,
        actor: &UserId,
        room_id: &RoomId,
        request_id: &RequestId,
    ) -> Result<AccessRequest, RoomError> {
        let mut manager = self.manager.write().await;
        manager.approve_access_request(actor, room_id, request_id)
    }

    /// Reject a pending access request
    pub async fn reject_access_request(
        &self,
        actor: &UserId,
        room_id: &RoomId,
        request_id: &RequestId,
    ) -> Result<AccessRequest, RoomError> {
        let mut manager = self.manager.write().await;
        manager.reject_access_request(actor, room_id, request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_notify::NoopNotifier;
    use crate::core_room::conversation::InMemoryConversations;
    use crate::core_room::friendship::InMemoryFriendGraph;
    use crate::core_room::types::Role;

    fn setup_async_manager() -> (AsyncRoomManager, Arc<InMemoryFriendGraph>) {
        let store = RoomSqlStore::memory().unwrap();
        let friendships = Arc::new(InMemoryFriendGraph::new());
        let manager = AsyncRoomManager::new(
            store,
            Arc::new(NoopNotifier),
            Arc::new(InMemoryConversations::new()),
            friendships.clone(),
        );
        (manager, friendships)
    }

    #[tokio::test]
    async fn test_create_room_async() {
        let (manager, _) = setup_async_manager();

        let room = manager
            .create_room(
                UserId::new("alice".to_string()),
                "Async Study".to_string(),
                None,
                RoomVisibility::Public,
            )
            .await
            .unwrap();

        assert_eq!(room.name, "Async Study");
        assert_eq!(room.owner_id, UserId::new("alice".to_string()));

        let fetched = manager.get_room(&room.id).await.unwrap();
        assert_eq!(fetched.id, room.id);
    }

    #[tokio::test]
    async fn test_join_and_leave_async() {
        let (manager, friendships) = setup_async_manager();
        let alice = UserId::new("alice".to_string());
        let bob = UserId::new("bob".to_string());

        let room = manager
            .create_room(
                alice.clone(),
                "Async Study".to_string(),
                None,
                RoomVisibility::Private,
            )
            .await
            .unwrap();

        friendships.add_friendship(&bob, &alice);
        let membership = manager.join_room(bob.clone(), &room.id).await.unwrap();
        assert_eq!(membership.role, Role::Member);

        let outcome = manager.leave_room(&bob, &room.id).await.unwrap();
        assert_eq!(outcome, LeaveOutcome::MemberLeft);
    }

    #[tokio::test]
    async fn test_shared_across_tasks() {
        let (manager, friendships) = setup_async_manager();
        let manager = Arc::new(manager);
        let alice = UserId::new("alice".to_string());

        let room = manager
            .create_room(
                alice.clone(),
                "Async Study".to_string(),
                None,
                RoomVisibility::Private,
            )
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let manager = manager.clone();
            let room_id = room.id.clone();
            let joiner = UserId::new(format!("user-{i}"));
            friendships.add_friendship(&joiner, &alice);
            handles.push(tokio::spawn(async move {
                manager.join_room(joiner, &room_id).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let fetched = manager.get_room(&room.id).await.unwrap();
        assert_eq!(fetched.current_members, 9);
    }
}
