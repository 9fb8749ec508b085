//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the gateway core and the outside world. Adapters implement these ports.
//!
//! - `AgentBackend` - Hosted conversational agent (sessions, messages, runs, output)
//! - `SessionRegistry` - Conversation id to backend session mapping

mod agent_backend;
mod session_registry;

pub use agent_backend::{AgentBackend, AgentBackendError, OutputMessage, RunFailure, RunSnapshot};
pub use session_registry::{SessionError, SessionRegistry};
