//! Background outbox delivery for long-lived hosts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};

use crate::engine::ProgressionEngine;
use crate::storage::ProgressStore;

/// Flush the engine's outbox every `interval` until `shutdown` flips to
/// true, then make one last pass. Returns the number of writes delivered.
///
/// The lock is held only for the synchronous flush itself, so UI steps
/// interleave between ticks.
pub async fn run_flusher<S>(
    engine: Arc<Mutex<ProgressionEngine<S>>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> usize
where
    S: ProgressStore + Send + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut delivered = 0usize;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = engine.lock().await.flush_outbox();
                delivered += report.delivered;
                if report.failed > 0 {
                    tracing::debug!(?report, "flusher pass hit a failure");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    let report = engine.lock().await.flush_outbox();
    delivered += report.delivered;
    tracing::debug!(delivered, remaining = report.remaining, "flusher stopped");
    delivered
}
