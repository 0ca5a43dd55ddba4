//! Notification layer for the room subsystem
//!
//! The room manager emits events here strictly after its transaction commits,
//! so a notification never describes state that rolled back. Delivery is best
//! effort and at most once; a failed or dropped notification is logged and
//! never retried, and no operation fails because of one.

pub mod event;
pub mod registry;

pub use event::RoomEvent;
pub use registry::{SessionId, SessionRegistry, DEFAULT_SESSION_CAPACITY};

use crate::core_room::{InviteId, RoomId, UserId};

/// Sink for post-commit room events
///
/// Implementations must not block for long and must swallow their own
/// failures; callers fire and forget.
pub trait EventNotifier: Send + Sync {
    /// Deliver an event to one user's live sessions, if any
    fn notify_user(&self, user_id: &UserId, event: RoomEvent);

    /// Deliver an event to every session attached to the room's feed
    fn notify_room(&self, room_id: &RoomId, event: RoomEvent);

    /// Forget pending deliveries that reference a room that no longer exists
    fn purge_room(&self, _room_id: &RoomId) {}

    /// Forget pending deliveries that reference a revoked or purged invitation
    fn purge_invitation(&self, _invite_id: &InviteId) {}
}

/// Notifier that discards everything (tests and headless tooling)
#[derive(Default)]
pub struct NoopNotifier;

impl EventNotifier for NoopNotifier {
    fn notify_user(&self, _user_id: &UserId, _event: RoomEvent) {}

    fn notify_room(&self, _room_id: &RoomId, _event: RoomEvent) {}
}
