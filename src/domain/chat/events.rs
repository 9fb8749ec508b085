//! Typed events pushed to the caller over the response stream.
//!
//! Every stream follows the grammar `metadata, chunk*, (done | error)`.
//! On the wire each event is a JSON object `{"type": ..., "data": {...}}`.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ConversationId, CorrelationId, MessageId, Timestamp};

/// One typed unit of the response stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum WireEvent {
    /// Opens the stream with the resolved identifiers.
    Metadata(MetadataPayload),
    /// Incremental response text.
    Chunk(ChunkPayload),
    /// Successful completion with the assembled response.
    Done(DonePayload),
    /// Failure after the stream opened.
    Error(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPayload {
    pub conversation_id: String,
    pub message_id: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPayload {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonePayload {
    pub message_id: String,
    pub total_content: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    pub correlation_id: String,
}

/// Discriminant of a [`WireEvent`], handy for grammar checks and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireEventKind {
    Metadata,
    Chunk,
    Done,
    Error,
}

impl WireEvent {
    pub fn metadata(
        conversation_id: &ConversationId,
        message_id: MessageId,
        timestamp: Timestamp,
    ) -> Self {
        Self::Metadata(MetadataPayload {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
            timestamp: timestamp.to_rfc3339(),
        })
    }

    pub fn chunk(content: impl Into<String>) -> Self {
        Self::Chunk(ChunkPayload {
            content: content.into(),
        })
    }

    pub fn done(
        message_id: MessageId,
        total_content: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self::Done(DonePayload {
            message_id: message_id.to_string(),
            total_content: total_content.into(),
            timestamp: timestamp.to_rfc3339(),
        })
    }

    pub fn error(message: impl Into<String>, correlation_id: CorrelationId) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
            correlation_id: correlation_id.to_string(),
        })
    }

    pub fn kind(&self) -> WireEventKind {
        match self {
            Self::Metadata(_) => WireEventKind::Metadata,
            Self::Chunk(_) => WireEventKind::Chunk,
            Self::Done(_) => WireEventKind::Done,
            Self::Error(_) => WireEventKind::Error,
        }
    }

    /// True for `done` and `error`, the events that close a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind(), WireEventKind::Done | WireEventKind::Error)
    }
}
