//! HTTP adapters - REST and SSE endpoints.

pub mod chat;

use ::http::{HeaderValue, Method};
use axum::Router;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use chat::{chat_router, ChatAppState};

/// A configured CORS origin that is not a valid header value.
#[derive(Debug, Clone, Error)]
#[error("Invalid CORS origin: {0}")]
pub struct InvalidCorsOrigin(pub String);

/// Builds the CORS layer; an empty origin list allows any origin.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer, InvalidCorsOrigin> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.is_empty() {
        return Ok(cors.allow_origin(Any));
    }

    let mut allowed = Vec::with_capacity(origins.len());
    for origin in origins {
        let value = origin
            .parse::<HeaderValue>()
            .map_err(|_| InvalidCorsOrigin(origin.clone()))?;
        allowed.push(value);
    }
    Ok(cors.allow_origin(allowed))
}

/// Full application router: chat routes plus tracing and CORS layers.
pub fn app_router(
    state: ChatAppState,
    cors_origins: &[String],
) -> Result<Router, InvalidCorsOrigin> {
    Ok(chat_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins)?))
}
