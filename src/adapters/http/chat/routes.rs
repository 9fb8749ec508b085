//! Axum routes for chat endpoints.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{chat_options, health, post_chat, ChatAppState};

/// Creates routes for chat endpoints.
///
/// - POST /chat - Stream an answer (SSE)
/// - OPTIONS /chat - Preflight
/// - GET /chat/health - Liveness probe
pub fn chat_routes() -> Router<ChatAppState> {
    Router::new()
        .route("/chat", post(post_chat).options(chat_options))
        .route("/chat/health", get(health))
}

/// Chat routes with state applied, ready to serve.
pub fn chat_router(state: ChatAppState) -> Router {
    chat_routes().with_state(state)
}
