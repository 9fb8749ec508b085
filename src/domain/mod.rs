//! Domain layer containing the gateway's core types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (identifiers, timestamps, state machine, errors)
//! - `chat` - Chat messages, conversation sessions, wire events, run status and request phases

pub mod chat;
pub mod foundation;
