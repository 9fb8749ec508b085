//! Agent Backend Adapters.
//!
//! Implementations of the AgentBackend port.
//!
//! ## Available Adapters
//!
//! - `HostedAgentClient` - HTTP client for the hosted threads/runs agent service
//! - `MockAgentBackend` - Scripted backend for testing

mod hosted_agent_client;
mod mock_backend;

pub use hosted_agent_client::{HostedAgentClient, HostedAgentConfig};
pub use mock_backend::{MockAgentBackend, MockOutput, MockRunStep};
