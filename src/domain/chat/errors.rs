//! Errors raised while validating a chat request.

use thiserror::Error;

/// Malformed or empty chat request. Always reported before streaming starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatValidationError {
    #[error("Message is required")]
    MessagesRequired,

    #[error("At least one user message with content is required")]
    NoUserMessage,

    #[error("Message exceeds maximum length of {max} characters")]
    MessageTooLong { max: usize },
}
