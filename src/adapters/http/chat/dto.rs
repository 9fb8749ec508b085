//! HTTP DTOs for chat endpoints.
//!
//! These types decouple the HTTP API from domain types, allowing independent evolution.

use serde::{Deserialize, Serialize};

use crate::application::StreamChatCommand;
use crate::domain::chat::{ChatMessage, ChatRole};
use crate::domain::foundation::CorrelationId;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Body of `POST /chat`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Full transcript; only the latest user message is forwarded.
    #[serde(default)]
    pub messages: Vec<ChatMessageDto>,
    /// Conversation to continue.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// One transcript entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessageDto {
    pub role: ChatRoleDto,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRoleDto {
    User,
    Assistant,
}

impl From<ChatMessageDto> for ChatMessage {
    fn from(dto: ChatMessageDto) -> Self {
        let role = match dto.role {
            ChatRoleDto::User => ChatRole::User,
            ChatRoleDto::Assistant => ChatRole::Assistant,
        };
        ChatMessage {
            role,
            content: dto.content,
            timestamp: dto.timestamp,
        }
    }
}

impl From<ChatRequest> for StreamChatCommand {
    fn from(request: ChatRequest) -> Self {
        StreamChatCommand {
            conversation_id: request.conversation_id,
            messages: request.messages.into_iter().map(ChatMessage::from).collect(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Error body for non-streaming failures.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ErrorResponse {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            correlation_id: None,
        }
    }

    pub fn internal(correlation_id: CorrelationId) -> Self {
        Self {
            error: "Internal server error".to_string(),
            correlation_id: Some(correlation_id.to_string()),
        }
    }
}

/// Body of `GET /chat/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub service: String,
}
