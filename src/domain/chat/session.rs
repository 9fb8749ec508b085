//! Conversation to backend session mapping.

use std::time::Duration;

use crate::domain::foundation::{BackendSessionId, ConversationId, Timestamp};

/// Durable link between a caller's conversation and the hosted agent session.
///
/// The backend session id never changes once the entry exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSession {
    conversation_id: ConversationId,
    backend_session_id: BackendSessionId,
    created_at: Timestamp,
}

impl ConversationSession {
    pub fn new(conversation_id: ConversationId, backend_session_id: BackendSessionId) -> Self {
        Self {
            conversation_id,
            backend_session_id,
            created_at: Timestamp::now(),
        }
    }

    /// Rebuilds a session with a known creation time.
    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn backend_session_id(&self) -> &BackendSessionId {
        &self.backend_session_id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Returns true if a TTL is set and the session has outlived it.
    pub fn is_expired(&self, ttl: Option<Duration>, now: &Timestamp) -> bool {
        ttl.is_some_and(|ttl| self.created_at.is_older_than(ttl, now))
    }
}
