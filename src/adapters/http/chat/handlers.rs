//! HTTP handlers for chat endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::application::{ChatError, EventStreamWriter, StreamChatCommand, StreamChatHandler};
use crate::domain::chat::ChatValidationError;
use crate::domain::foundation::{CorrelationId, Timestamp};

use super::dto::{ChatRequest, ErrorResponse, HealthResponse};
use super::streaming::sse_response;

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for chat handlers.
#[derive(Clone)]
pub struct ChatAppState {
    pub handler: Arc<StreamChatHandler>,
    /// Events buffered between the handler and the response body.
    pub channel_capacity: usize,
    /// Interval of SSE keep-alive comments.
    pub keep_alive: Duration,
    /// Name reported by the health endpoint.
    pub service_name: String,
}

impl ChatAppState {
    pub fn new(handler: Arc<StreamChatHandler>) -> Self {
        Self {
            handler,
            channel_capacity: 32,
            keep_alive: Duration::from_secs(15),
            service_name: env!("CARGO_PKG_NAME").to_string(),
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// POST /chat
// ════════════════════════════════════════════════════════════════════════════════

/// POST /chat - Stream the assistant's answer as Server-Sent Events.
///
/// # Errors
///
/// - 400 when the body is malformed or has no usable user message
/// - 500 when no agent session could be obtained
pub async fn post_chat(
    State(state): State<ChatAppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ChatApiError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "Malformed chat request");
        ChatApiError::BadRequest(rejection.body_text())
    })?;

    let prepared = state
        .handler
        .prepare(StreamChatCommand::from(request))
        .await?;

    let span = tracing::info_span!(
        "chat_stream",
        conversation_id = %prepared.conversation_id(),
        message_id = %prepared.message_id(),
    );

    let (writer, events) = EventStreamWriter::channel(state.channel_capacity);
    let cancel = CancellationToken::new();
    let cancel_on_drop = cancel.clone().drop_guard();

    let handler = state.handler.clone();
    tokio::spawn(
        async move {
            let outcome = handler.run(prepared, &writer, cancel).await;
            tracing::debug!(outcome = ?outcome, "Chat stream finished");
        }
        .instrument(span),
    );

    Ok(sse_response(events, cancel_on_drop, state.keep_alive).into_response())
}

/// OPTIONS /chat - Preflight acknowledgement.
pub async fn chat_options() -> StatusCode {
    StatusCode::OK
}

// ════════════════════════════════════════════════════════════════════════════════
// GET /chat/health
// ════════════════════════════════════════════════════════════════════════════════

/// GET /chat/health - Liveness probe.
pub async fn health(State(state): State<ChatAppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Timestamp::now().to_rfc3339(),
        service: state.service_name.clone(),
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type for chat endpoints.
#[derive(Debug)]
pub enum ChatApiError {
    BadRequest(String),
    Internal(CorrelationId),
}

impl From<ChatError> for ChatApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Validation { source, .. } => ChatApiError::from(source),
            ChatError::Session { correlation_id, .. } => ChatApiError::Internal(correlation_id),
        }
    }
}

impl From<ChatValidationError> for ChatApiError {
    fn from(err: ChatValidationError) -> Self {
        ChatApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ChatApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ChatApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::bad_request(msg))
            }
            ChatApiError::Internal(correlation_id) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::internal(correlation_id),
            ),
        };

        (status, Json(body)).into_response()
    }
}
