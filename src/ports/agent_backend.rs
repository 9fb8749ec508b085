//! Agent Backend Port - Interface for the hosted conversational agent.
//!
//! The hosted agent works asynchronously: a message is posted into a session
//! (thread), a run is started against it, and the run is polled until it
//! reaches a terminal status. Output appears as assistant messages attached
//! to the run, which may grow while the run is in progress.
//!
//! # Design
//!
//! - One method per protocol primitive, so the polling state machine lives in
//!   the application layer and can be tested against a scripted backend
//! - `list_output` accepts a checkpoint (the last message id known to be
//!   complete) so only new or still-growing output is transferred
//! - Error types for common failure modes with retry classification

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::chat::RunStatus;
use crate::domain::foundation::{BackendSessionId, RunId};

/// Port for hosted agent interactions.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Create a new backend session (thread).
    async fn create_session(&self) -> Result<BackendSessionId, AgentBackendError>;

    /// Post a user message into the session.
    async fn post_message(
        &self,
        session_id: &BackendSessionId,
        content: &str,
    ) -> Result<(), AgentBackendError>;

    /// Start a run of the agent against the session.
    async fn create_run(
        &self,
        session_id: &BackendSessionId,
    ) -> Result<RunSnapshot, AgentBackendError>;

    /// Fetch the current status of a run.
    async fn get_run(
        &self,
        session_id: &BackendSessionId,
        run_id: &RunId,
    ) -> Result<RunSnapshot, AgentBackendError>;

    /// List the assistant output of a run in creation order.
    ///
    /// When `after` is set, only messages created after that message id are
    /// returned.
    async fn list_output(
        &self,
        session_id: &BackendSessionId,
        run_id: &RunId,
        after: Option<&str>,
    ) -> Result<Vec<OutputMessage>, AgentBackendError>;

    /// Ask the backend to stop a run.
    async fn cancel_run(
        &self,
        session_id: &BackendSessionId,
        run_id: &RunId,
    ) -> Result<(), AgentBackendError>;
}

/// Point-in-time view of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSnapshot {
    pub id: RunId,
    pub status: RunStatus,
    /// Backend-provided failure details, when the run failed.
    pub last_error: Option<RunFailure>,
}

impl RunSnapshot {
    pub fn new(id: RunId, status: RunStatus) -> Self {
        Self {
            id,
            status,
            last_error: None,
        }
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.last_error = Some(RunFailure {
            code: code.into(),
            message: message.into(),
        });
        self
    }
}

/// Failure details reported for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub code: String,
    pub message: String,
}

/// One assistant message produced by a run, with its text so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMessage {
    pub id: String,
    pub text: String,
}

impl OutputMessage {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Hosted agent errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentBackendError {
    /// Rate limited by the backend.
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u32 },

    /// Backend is unavailable.
    #[error("agent service unavailable: {message}")]
    Unavailable { message: String },

    /// API key rejected.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Session or run does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Network error during request.
    #[error("network error: {0}")]
    Network(String),

    /// Failed to parse backend response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Request rejected by the backend.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request timed out.
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u32 },
}

impl AgentBackendError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentBackendError::RateLimited { .. }
                | AgentBackendError::Unavailable { .. }
                | AgentBackendError::Network(_)
                | AgentBackendError::Timeout { .. }
        )
    }
}
