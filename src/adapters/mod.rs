//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the gateway core to external systems:
//! - `agent` - Hosted agent HTTP client and a scripted mock
//! - `session` - In-memory conversation session registry
//! - `http` - axum routes serving the chat stream

pub mod agent;
pub mod http;
pub mod session;
