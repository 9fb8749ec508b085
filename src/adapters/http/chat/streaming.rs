//! Server-Sent Events framing for chat responses.
//!
//! Each [`WireEvent`] becomes one `data: <json>` frame. The body stream holds
//! the request's cancellation drop-guard, so when the client disconnects and
//! axum drops the body, the handler and the agent poller are cancelled.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::DropGuard;

use crate::domain::chat::WireEvent;

/// Encode one wire event as an SSE frame.
pub fn to_sse_event(event: &WireEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|err| {
        tracing::error!(error = %err, kind = ?event.kind(), "Failed to encode wire event");
        Event::default().data(r#"{"type":"error","data":{"message":"Encoding failure","correlationId":""}}"#)
    })
}

/// Build the SSE response body from the writer's receiving end.
pub fn sse_response(
    events: mpsc::Receiver<WireEvent>,
    cancel_on_drop: DropGuard,
    keep_alive: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(events).map(move |event| {
        let _held = &cancel_on_drop;
        Ok(to_sse_event(&event))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(keep_alive))
}
