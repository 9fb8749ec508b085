//! Command handlers.

pub mod chat;

pub use chat::{ChatError, ChatOutcome, PreparedChat, StreamChatCommand, StreamChatHandler};
