//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, the state machine trait and the
//! validation error type used across the gateway.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::ValidationError;
pub use ids::{BackendSessionId, ConversationId, CorrelationId, MessageId, RunId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
