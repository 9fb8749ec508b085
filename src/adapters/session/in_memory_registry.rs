//! In-Memory Session Registry Adapter
//!
//! Maps conversation ids to hosted agent sessions in process memory.
//!
//! Each conversation id owns a `OnceCell`. The map lock is only held to find
//! or insert the cell; the backend call happens inside the cell's
//! initializer, so concurrent first requests for one id share a single
//! creation while requests for other ids proceed independently. A failed
//! initializer leaves the cell empty; the last request holding it removes it
//! from the map so failures never accumulate entries.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};

use crate::domain::chat::ConversationSession;
use crate::domain::foundation::{ConversationId, Timestamp};
use crate::ports::{AgentBackend, SessionError, SessionRegistry};

type SessionCell = Arc<OnceCell<ConversationSession>>;

/// In-memory registry for single-server deployments.
pub struct InMemorySessionRegistry {
    backend: Arc<dyn AgentBackend>,
    entries: RwLock<HashMap<ConversationId, SessionCell>>,
    /// Sessions older than this are replaced on next use; `None` keeps them forever.
    ttl: Option<Duration>,
}

impl InMemorySessionRegistry {
    /// Create a registry whose sessions live for the process lifetime.
    pub fn new(backend: Arc<dyn AgentBackend>) -> Self {
        Self {
            backend,
            entries: RwLock::new(HashMap::new()),
            ttl: None,
        }
    }

    /// Expire sessions after `ttl`.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Look up a live session without creating one.
    pub async fn get(&self, conversation_id: &ConversationId) -> Option<ConversationSession> {
        let now = Timestamp::now();
        let entries = self.entries.read().await;
        entries
            .get(conversation_id)
            .and_then(|cell| cell.get())
            .filter(|session| !session.is_expired(self.ttl, &now))
            .cloned()
    }

    /// Find or insert the cell for `conversation_id`, replacing an expired one.
    async fn cell_for(&self, conversation_id: &ConversationId, now: &Timestamp) -> SessionCell {
        let mut entries = self.entries.write().await;
        let cell = entries
            .entry(conversation_id.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()));

        if cell.get().is_some_and(|s| s.is_expired(self.ttl, now)) {
            tracing::debug!(conversation_id = %conversation_id, "Session expired, replacing");
            *cell = Arc::new(OnceCell::new());
        }

        cell.clone()
    }

    /// Drop `cell` from the map if it is still the entry for `conversation_id`,
    /// still empty, and no other request is waiting on it.
    async fn discard_failed(&self, conversation_id: &ConversationId, cell: &SessionCell) {
        let mut entries = self.entries.write().await;
        let discard = entries.get(conversation_id).is_some_and(|current| {
            // One reference is the map's, one is ours.
            Arc::ptr_eq(current, cell) && !current.initialized() && Arc::strong_count(current) <= 2
        });
        if discard {
            entries.remove(conversation_id);
        }
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn get_or_create(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ConversationSession, SessionError> {
        if let Some(session) = self.get(conversation_id).await {
            return Ok(session);
        }

        let now = Timestamp::now();
        let cell = self.cell_for(conversation_id, &now).await;

        let created = cell
            .get_or_try_init(|| async {
                let backend_session_id =
                    self.backend.create_session().await.map_err(|source| {
                        tracing::warn!(
                            conversation_id = %conversation_id,
                            error = %source,
                            "Backend session creation failed"
                        );
                        SessionError::CreationFailed {
                            conversation_id: conversation_id.clone(),
                            source,
                        }
                    })?;

                tracing::info!(
                    conversation_id = %conversation_id,
                    session_id = %backend_session_id,
                    "Created backend session"
                );
                Ok::<_, SessionError>(ConversationSession::new(
                    conversation_id.clone(),
                    backend_session_id,
                ))
            })
            .await
            .cloned();

        if created.is_err() {
            self.discard_failed(conversation_id, &cell).await;
        }
        created
    }

    async fn remove(&self, conversation_id: &ConversationId) -> bool {
        self.entries
            .write()
            .await
            .remove(conversation_id)
            .is_some_and(|cell| cell.initialized())
    }

    async fn evict_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }

        let now = Timestamp::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        // Empty cells may have an initializer in flight; only settled, stale entries go.
        entries.retain(|_, cell| !cell.get().is_some_and(|s| s.is_expired(self.ttl, &now)));
        before - entries.len()
    }

    async fn len(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }
}
