//! Chat messages supplied by the caller and request validation.

use serde::{Deserialize, Serialize};

use super::errors::ChatValidationError;

/// Maximum accepted length of the forwarded user message, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 32_000;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One entry of the caller's conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Client-side timestamp, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ChatMessage {
    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            timestamp: None,
        }
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp: None,
        }
    }

    fn is_user_with_content(&self) -> bool {
        self.role == ChatRole::User && !self.content.trim().is_empty()
    }
}

/// Picks the message to forward to the agent: the most recent user-authored
/// message with non-blank content.
///
/// # Errors
///
/// - `MessagesRequired` when the transcript is empty
/// - `NoUserMessage` when no user message carries content
/// - `MessageTooLong` when the selected message exceeds [`MAX_MESSAGE_LENGTH`]
pub fn latest_user_message(messages: &[ChatMessage]) -> Result<&ChatMessage, ChatValidationError> {
    if messages.is_empty() {
        return Err(ChatValidationError::MessagesRequired);
    }

    let message = messages
        .iter()
        .rev()
        .find(|m| m.is_user_with_content())
        .ok_or(ChatValidationError::NoUserMessage)?;

    if message.content.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ChatValidationError::MessageTooLong {
            max: MAX_MESSAGE_LENGTH,
        });
    }

    Ok(message)
}
