//! Event stream writer.
//!
//! Pushes typed [`WireEvent`]s toward the HTTP response. The transport side
//! owns the receiver; once it is dropped (client disconnected) every write
//! becomes a no-op that reports `false`. A write blocked on a full buffer is
//! abandoned as soon as the request's cancel token fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::chat::WireEvent;

/// Sending half of one response stream.
#[derive(Debug, Clone)]
pub struct EventStreamWriter {
    tx: mpsc::Sender<WireEvent>,
    closed: Arc<AtomicBool>,
}

impl EventStreamWriter {
    /// Create a writer and the receiver the transport drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<WireEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Queue `event`, waiting for buffer space.
    ///
    /// Returns `false` without queuing when the transport is gone or `cancel`
    /// fires before the event fits in the buffer.
    pub async fn write(&self, event: WireEvent, cancel: &CancellationToken) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        let kind = event.kind();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(event = ?kind, "Request cancelled, dropping event");
                false
            }
            sent = self.tx.send(event) => match sent {
                Ok(()) => true,
                Err(_) => {
                    self.closed.store(true, Ordering::Release);
                    tracing::debug!(event = ?kind, "Transport closed, dropping event");
                    false
                }
            },
        }
    }

    /// True once the transport has gone away.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }
}
