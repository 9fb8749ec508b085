//! Periodic eviction of expired conversation sessions.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ports::SessionRegistry;

/// Spawn a task calling [`SessionRegistry::evict_expired`] every `interval`
/// until `shutdown` fires.
pub fn spawn_session_sweeper(
    registry: Arc<dyn SessionRegistry>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = registry.evict_expired().await;
                    if evicted > 0 {
                        let remaining = registry.len().await;
                        tracing::info!(evicted, remaining, "Evicted expired sessions");
                    }
                }
            }
        }

        tracing::debug!("Session sweeper stopped");
    })
}
