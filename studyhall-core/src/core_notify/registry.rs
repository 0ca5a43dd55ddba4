//! Session Registry
//!
//! Tracks which users currently have live sessions and routes room events to
//! them over bounded channels. Delivery is fire-and-forget: a session whose
//! queue is full simply misses the event, and nothing is retried. Offline
//! users miss events entirely; clients reconcile against the store when they
//! reconnect.

use super::event::RoomEvent;
use super::EventNotifier;
use crate::core_room::{RoomId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

/// Default per-session event queue depth
pub const DEFAULT_SESSION_CAPACITY: usize = 64;

/// Identifier of one live session (one device / one connection)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        use uuid::Uuid;
        SessionId(Uuid::new_v4().to_string())
    }
}

struct Session {
    user_id: UserId,
    tx: mpsc::Sender<RoomEvent>,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<SessionId, Session>,
    by_user: HashMap<UserId, HashSet<SessionId>>,
    by_room: HashMap<RoomId, HashSet<SessionId>>,
}

/// In-process event router keyed by user and by room feed
pub struct SessionRegistry {
    capacity: usize,
    inner: Mutex<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Attach a session for the user and hand back its event stream
    pub fn connect(&self, user_id: UserId) -> (SessionId, mpsc::Receiver<RoomEvent>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let session_id = SessionId::generate();

        let mut inner = self.inner.lock().unwrap();
        inner
            .by_user
            .entry(user_id.clone())
            .or_default()
            .insert(session_id.clone());
        inner
            .sessions
            .insert(session_id.clone(), Session { user_id, tx });
        crate::metrics::set_active_sessions(inner.sessions.len());

        (session_id, rx)
    }

    /// Detach a session and forget its room subscriptions
    pub fn disconnect(&self, session_id: &SessionId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(session) = inner.sessions.remove(session_id) {
            if let Some(ids) = inner.by_user.get_mut(&session.user_id) {
                ids.remove(session_id);
                if ids.is_empty() {
                    inner.by_user.remove(&session.user_id);
                }
            }
        }
        for ids in inner.by_room.values_mut() {
            ids.remove(session_id);
        }
        inner.by_room.retain(|_, ids| !ids.is_empty());
        crate::metrics::set_active_sessions(inner.sessions.len());
    }

    /// Subscribe a session to a room's feed; returns false for an unknown session
    pub fn watch_room(&self, session_id: &SessionId, room_id: RoomId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.sessions.contains_key(session_id) {
            return false;
        }
        inner
            .by_room
            .entry(room_id)
            .or_default()
            .insert(session_id.clone());
        true
    }

    /// Unsubscribe a session from a room's feed
    pub fn unwatch_room(&self, session_id: &SessionId, room_id: &RoomId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(ids) = inner.by_room.get_mut(room_id) {
            ids.remove(session_id);
            if ids.is_empty() {
                inner.by_room.remove(room_id);
            }
        }
    }

    /// Number of currently attached sessions
    pub fn session_count(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }

    fn deliver(session: &Session, event: RoomEvent) {
        let kind = event.kind();
        match session.tx.try_send(event) {
            Ok(()) => crate::metrics::notification_delivered(kind),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    user_id = %session.user_id,
                    event = kind,
                    "session queue full, dropping event"
                );
                crate::metrics::notification_dropped(kind);
            }
            // Receiver gone; the session is swept on disconnect
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_CAPACITY)
    }
}

impl EventNotifier for SessionRegistry {
    fn notify_user(&self, user_id: &UserId, event: RoomEvent) {
        let inner = self.inner.lock().unwrap();
        let Some(session_ids) = inner.by_user.get(user_id) else {
            return;
        };
        for session_id in session_ids {
            if let Some(session) = inner.sessions.get(session_id) {
                Self::deliver(session, event.clone());
            }
        }
    }

    fn notify_room(&self, room_id: &RoomId, event: RoomEvent) {
        let inner = self.inner.lock().unwrap();
        let Some(session_ids) = inner.by_room.get(room_id) else {
            return;
        };
        for session_id in session_ids {
            if let Some(session) = inner.sessions.get(session_id) {
                Self::deliver(session, event.clone());
            }
        }
    }

    fn purge_room(&self, room_id: &RoomId) {
        // Stop routing to the feed; events already queued stay where they are
        let mut inner = self.inner.lock().unwrap();
        inner.by_room.remove(room_id);
    }
}
