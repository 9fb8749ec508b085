//! Application layer - Commands, Handlers and stream orchestration.
//!
//! This layer coordinates the ports: it turns a chat command into a session
//! lookup, an agent run and a sequence of wire events.

pub mod agent_stream;
pub mod event_stream;
pub mod handlers;

pub use agent_stream::{AgentStreamClient, AgentStreamConfig, FragmentStream, StreamingError};
pub use event_stream::EventStreamWriter;
pub use handlers::{ChatError, ChatOutcome, PreparedChat, StreamChatCommand, StreamChatHandler};
