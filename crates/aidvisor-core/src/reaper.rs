//! Background expiry.
//!
//! Two flavours: a periodic sweeper per cache namespace, and a one-shot
//! deferred delete per settled ticket. Both stop when the shared
//! cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::tickets::TicketStore;

/// Start the periodic sweeper for `cache`: one sweep immediately, then one per
/// `period`. Returns `None` if a sweeper was already started for this cache.
pub fn spawn_cache_reaper(
    cache: Arc<ResponseCache>,
    period: Duration,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>> {
    if !cache.claim_reaper() {
        debug!(
            target: "aidvisor::reaper",
            namespace = cache.namespace(),
            "cache reaper already running"
        );
        return None;
    }
    info!(
        target: "aidvisor::reaper",
        namespace = cache.namespace(),
        period_secs = period.as_secs(),
        "cache reaper started"
    );
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match cache.sweep().await {
                Ok(report) => info!(
                    target: "aidvisor::reaper",
                    namespace = cache.namespace(),
                    scanned = report.scanned,
                    removed = report.removed,
                    errors = report.errors,
                    "cache sweep finished"
                ),
                Err(err) => warn!(
                    target: "aidvisor::reaper",
                    namespace = cache.namespace(),
                    error = %err,
                    "cache sweep failed"
                ),
            }
        }
        debug!(target: "aidvisor::reaper", namespace = cache.namespace(), "cache reaper stopped");
    }))
}

/// Delete ticket `id` after `retention` unless it has already been collected.
pub fn spawn_ticket_expiry(
    tickets: Arc<TicketStore>,
    id: String,
    retention: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(retention) => {
                if tickets.delete(&id) {
                    debug!(target: "aidvisor::reaper", id = %id, "uncollected ticket expired");
                }
            }
        }
    })
}
