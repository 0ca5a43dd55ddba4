//! Conversation binder seam
//!
//! Every room is backed by exactly one conversation in the chat layer. The
//! manager creates the conversation before it persists the room, mirrors
//! membership changes into the participant list after commit, and deletes
//! the conversation when the room is hard-deleted. The chat layer itself is
//! outside this subsystem.

use super::error::RoomError;
use super::types::{ConversationId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Bridge to the chat layer's conversation store
pub trait ConversationBinder: Send + Sync {
    /// Create an empty conversation and return its id
    fn create_conversation(&self) -> Result<ConversationId, RoomError>;

    /// Add a user to the conversation. Adding an existing participant is a no-op.
    fn add_participant(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<(), RoomError>;

    /// Remove a user from the conversation. Removing an absent participant is a no-op.
    fn remove_participant(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<(), RoomError>;

    /// Delete the conversation and its participant list
    fn delete_conversation(&self, conversation_id: &ConversationId) -> Result<(), RoomError>;
}

/// In-process conversation store (tests and single-node setups)
#[derive(Default)]
pub struct InMemoryConversations {
    conversations: Mutex<HashMap<ConversationId, HashSet<UserId>>>,
}

impl InMemoryConversations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current participants, or None if the conversation does not exist
    pub fn participants(&self, conversation_id: &ConversationId) -> Option<Vec<UserId>> {
        let conversations = self.conversations.lock().unwrap();
        conversations
            .get(conversation_id)
            .map(|users| users.iter().cloned().collect())
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.lock().unwrap().len()
    }
}

impl ConversationBinder for InMemoryConversations {
    fn create_conversation(&self) -> Result<ConversationId, RoomError> {
        let id = ConversationId::generate();
        let mut conversations = self.conversations.lock().unwrap();
        conversations.insert(id.clone(), HashSet::new());
        Ok(id)
    }

    fn add_participant(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<(), RoomError> {
        let mut conversations = self.conversations.lock().unwrap();
        let participants = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| RoomError::Internal(format!("no conversation {conversation_id}")))?;
        participants.insert(user_id.clone());
        Ok(())
    }

    fn remove_participant(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<(), RoomError> {
        let mut conversations = self.conversations.lock().unwrap();
        let participants = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| RoomError::Internal(format!("no conversation {conversation_id}")))?;
        participants.remove(user_id);
        Ok(())
    }

    fn delete_conversation(&self, conversation_id: &ConversationId) -> Result<(), RoomError> {
        let mut conversations = self.conversations.lock().unwrap();
        conversations.remove(conversation_id);
        Ok(())
    }
}
