//! Session Registry Port - conversation id to backend session mapping.
//!
//! Implementations must create at most one backend session per conversation
//! id, even when several first requests for that id race each other.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::chat::ConversationSession;
use crate::domain::foundation::ConversationId;

use super::AgentBackendError;

/// Port for resolving conversation sessions.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Return the session for `conversation_id`, creating it on first use.
    ///
    /// A failed creation is not cached; the next call tries again.
    async fn get_or_create(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ConversationSession, SessionError>;

    /// Forget the session for `conversation_id`. Returns true if one existed.
    async fn remove(&self, conversation_id: &ConversationId) -> bool;

    /// Drop sessions that outlived the configured TTL. Returns how many were removed.
    async fn evict_expired(&self) -> usize;

    /// Number of tracked conversations.
    async fn len(&self) -> usize;
}

/// Session resolution errors.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("failed to create backend session for conversation {conversation_id}: {source}")]
    CreationFailed {
        conversation_id: ConversationId,
        #[source]
        source: AgentBackendError,
    },
}
