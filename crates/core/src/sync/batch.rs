//! One scheduler run: select due connections and sync them with bounded
//! concurrency

use std::sync::Arc;

use hearthsync_common::SharedClock;
use hearthsync_domain::{HearthSyncError, Result, SchedulerSettings};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::service::{ConnectionSyncService, SyncAttempt};
use crate::connections::ports::ConnectionRepository;

/// Aggregate result of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// Connections selected as due.
    pub selected: usize,
    /// Connections whose sync actually ran.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Claimed elsewhere, changed state meanwhile, or not dispatched before
    /// cancellation.
    pub skipped: usize,
    pub events_changed: u64,
}

impl BatchSummary {
    fn record(&mut self, attempt: &SyncAttempt) {
        match attempt {
            SyncAttempt::Completed(outcome) => {
                self.attempted += 1;
                if outcome.success {
                    self.succeeded += 1;
                    self.events_changed += u64::from(outcome.total_changes());
                } else {
                    self.failed += 1;
                }
            }
            SyncAttempt::Skipped(_) => self.skipped += 1,
        }
    }
}

/// Limits for one batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    pub batch_limit: usize,
    pub max_concurrency: usize,
}

impl From<&SchedulerSettings> for BatchLimits {
    fn from(settings: &SchedulerSettings) -> Self {
        Self { batch_limit: settings.batch_limit, max_concurrency: settings.max_concurrency }
    }
}

/// Selects due connections and fans them out over a bounded worker pool.
pub struct SyncBatchRunner {
    connections: Arc<dyn ConnectionRepository>,
    sync: Arc<ConnectionSyncService>,
    clock: SharedClock,
    limits: BatchLimits,
}

impl SyncBatchRunner {
    pub fn new(
        connections: Arc<dyn ConnectionRepository>,
        sync: Arc<ConnectionSyncService>,
        clock: SharedClock,
        limits: BatchLimits,
    ) -> Self {
        Self { connections, sync, clock, limits }
    }

    /// Run one batch.
    ///
    /// Per-connection failures are counted, never returned. A store failure
    /// or cancellation stops dispatching while in-flight syncs finish; the
    /// store failure is then returned.
    #[instrument(skip_all)]
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<BatchSummary> {
        let now = self.clock.now();
        let due = self.connections.find_due(now, self.limits.batch_limit).await?;
        let mut summary = BatchSummary { selected: due.len(), ..BatchSummary::default() };
        if due.is_empty() {
            debug!("no connections due");
            return Ok(summary);
        }

        let permits = Arc::new(Semaphore::new(self.limits.max_concurrency.max(1)));
        let stop = cancel.child_token();
        let mut workers: JoinSet<Result<SyncAttempt>> = JoinSet::new();
        let mut dispatched = 0usize;

        for connection in due {
            let permit = tokio::select! {
                biased;
                () = stop.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let sync = Arc::clone(&self.sync);
            let stop_on_store_failure = stop.clone();
            workers.spawn(async move {
                let _permit = permit;
                let result = sync.sync_connection(connection).await;
                if result.is_err() {
                    stop_on_store_failure.cancel();
                }
                result
            });
            dispatched += 1;
        }

        let mut store_failure: Option<HearthSyncError> = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(attempt)) => summary.record(&attempt),
                Ok(Err(err)) => {
                    error!(error = %err, "entity store failure during batch");
                    store_failure.get_or_insert(err);
                }
                Err(join_err) => {
                    error!(error = %join_err, "sync worker panicked");
                    summary.failed += 1;
                    summary.attempted += 1;
                }
            }
        }

        summary.skipped += summary.selected - dispatched;

        if let Some(err) = store_failure {
            return Err(err);
        }

        info!(
            selected = summary.selected,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            events_changed = summary.events_changed,
            cancelled = cancel.is_cancelled(),
            "sync batch finished"
        );
        Ok(summary)
    }
}
