//! Friendship oracle seam
//!
//! The social graph lives outside this subsystem. A direct join requires an
//! accepted friendship between the joiner and the room owner (invitations and
//! invite links carry their own authorization), and the manager asks this
//! oracle at the moment of the check. The answer is never cached alongside
//! room state.

use super::types::UserId;
use std::collections::HashSet;
use std::sync::Mutex;

/// Read-only view of the social graph
pub trait FriendshipOracle: Send + Sync {
    /// Whether an accepted friendship exists between the two users.
    /// Friendship is symmetric; argument order does not matter.
    fn is_connected(&self, a: &UserId, b: &UserId) -> bool;
}

/// Mutable in-process friend graph (tests and single-node setups)
#[derive(Default)]
pub struct InMemoryFriendGraph {
    edges: Mutex<HashSet<(UserId, UserId)>>,
}

impl InMemoryFriendGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted friendship between two users
    pub fn add_friendship(&self, a: &UserId, b: &UserId) {
        let mut edges = self.edges.lock().unwrap();
        edges.insert(Self::edge(a, b));
    }

    /// Remove a friendship
    pub fn remove_friendship(&self, a: &UserId, b: &UserId) {
        let mut edges = self.edges.lock().unwrap();
        edges.remove(&Self::edge(a, b));
    }

    // Store each pair once, in id order
    fn edge(a: &UserId, b: &UserId) -> (UserId, UserId) {
        if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        }
    }
}

impl FriendshipOracle for InMemoryFriendGraph {
    fn is_connected(&self, a: &UserId, b: &UserId) -> bool {
        let edges = self.edges.lock().unwrap();
        edges.contains(&Self::edge(a, b))
    }
}
