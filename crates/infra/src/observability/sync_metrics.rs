//! Counters for scheduled sync runs
//!
//! ## Design
//! - **No locking** - independent atomic counters, `Relaxed` ordering
//! - **Snapshot reads** - `snapshot()` copies every counter for logging

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hearthsync_core::BatchSummary;
use serde::Serialize;

/// Running totals across scheduler ticks.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    runs: AtomicU64,
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    /// Connections skipped because another worker held the claim or the
    /// connection changed state.
    conflicts: AtomicU64,
    timeouts: AtomicU64,
    run_errors: AtomicU64,
    events_changed: AtomicU64,
    sessions_purged: AtomicU64,
    last_run_micros: AtomicU64,
}

/// Point-in-time copy of [`SyncMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetricsSnapshot {
    pub runs: u64,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub conflicts: u64,
    pub timeouts: u64,
    pub run_errors: u64,
    pub events_changed: u64,
    pub sessions_purged: u64,
    pub last_run_micros: u64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_batch(&self, summary: &BatchSummary, elapsed: Duration) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.attempts.fetch_add(summary.attempted as u64, Ordering::Relaxed);
        self.successes.fetch_add(summary.succeeded as u64, Ordering::Relaxed);
        self.failures.fetch_add(summary.failed as u64, Ordering::Relaxed);
        self.conflicts.fetch_add(summary.skipped as u64, Ordering::Relaxed);
        self.events_changed.fetch_add(summary.events_changed, Ordering::Relaxed);
        self.record_duration(elapsed);
    }

    /// The batch itself failed (store unavailable) before producing a summary.
    pub fn record_run_error(&self, elapsed: Duration) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.run_errors.fetch_add(1, Ordering::Relaxed);
        self.record_duration(elapsed);
    }

    pub fn record_timeout(&self) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sessions_purged(&self, count: usize) {
        self.sessions_purged.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn record_duration(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.last_run_micros.store(micros, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            run_errors: self.run_errors.load(Ordering::Relaxed),
            events_changed: self.events_changed.load(Ordering::Relaxed),
            sessions_purged: self.sessions_purged.load(Ordering::Relaxed),
            last_run_micros: self.last_run_micros.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_accumulate() {
        let metrics = SyncMetrics::new();
        let summary = BatchSummary {
            selected: 4,
            attempted: 3,
            succeeded: 2,
            failed: 1,
            skipped: 1,
            events_changed: 7,
        };
        metrics.record_batch(&summary, Duration::from_millis(12));
        metrics.record_batch(&summary, Duration::from_millis(3));
        metrics.record_timeout();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.runs, 3);
        assert_eq!(snapshot.attempts, 6);
        assert_eq!(snapshot.successes, 4);
        assert_eq!(snapshot.failures, 2);
        assert_eq!(snapshot.conflicts, 2);
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.events_changed, 14);
        assert_eq!(snapshot.last_run_micros, 3_000);
    }
}
