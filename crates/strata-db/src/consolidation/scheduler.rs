//! Periodic consolidation on a background task.

use std::sync::Arc;
use std::time::Duration;

use strata_core::responses::ConsolidationSweep;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::service::MemoryService;

/// Runs [`MemoryService::consolidate_batch`] every `interval` until told to
/// stop.
///
/// Entities skipped on conflict are simply picked up again on a later tick.
pub struct ConsolidationScheduler {
    service: Arc<MemoryService>,
    interval: Duration,
}

impl ConsolidationScheduler {
    #[must_use]
    pub const fn new(service: Arc<MemoryService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Run one pass immediately, then one per interval.
    ///
    /// Returns the accumulated totals once `shutdown` flips to `true` or its
    /// sender is dropped. A pass in progress is allowed to finish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> ConsolidationSweep {
        let mut totals = ConsolidationSweep::default();
        tracing::info!(interval_secs = self.interval.as_secs(), "consolidation scheduler started");
        loop {
            match self.service.consolidate_batch().await {
                Ok(sweep) => merge_totals(&mut totals, &sweep),
                Err(error) => tracing::warn!(%error, "consolidation pass failed"),
            }

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!(
            scanned = totals.scanned,
            consolidated = totals.consolidated,
            archived = totals.archived,
            "consolidation scheduler stopped"
        );
        totals
    }

    /// Spawn [`Self::run`] on the runtime.
    ///
    /// Send `true` on the returned sender to stop it.
    #[must_use]
    pub fn spawn(self) -> (JoinHandle<ConsolidationSweep>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(self.run(rx));
        (handle, tx)
    }
}

const fn merge_totals(totals: &mut ConsolidationSweep, sweep: &ConsolidationSweep) {
    totals.scanned += sweep.scanned;
    totals.consolidated += sweep.consolidated;
    totals.archived += sweep.archived;
    totals.noop += sweep.noop;
    totals.ineligible += sweep.ineligible;
    totals.skipped += sweep.skipped;
}
