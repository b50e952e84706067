//! Failure classification and the connection state machine
//!
//! Applies a sync result to a connection in memory. Persisting the mutated
//! connection is the caller's job (version-checked write).

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use hearthsync_common::ExponentialBackoff;
use hearthsync_domain::{BackoffConfig, CalendarConnection, ConnectionStatus, SyncErrorKind};
use tracing::{debug, warn};

/// Failure details fed into [`FailureBackoffManager::record_failure`].
#[derive(Debug, Clone, Copy)]
pub struct FailureReport<'a> {
    pub kind: SyncErrorKind,
    pub message: &'a str,
    pub retry_after_secs: Option<u64>,
}

/// Mutates status, failure count and `next_sync_at` after each attempt.
#[derive(Debug, Clone)]
pub struct FailureBackoffManager {
    backoff: ExponentialBackoff,
    failure_threshold: u32,
}

impl FailureBackoffManager {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            backoff: ExponentialBackoff::new(
                StdDuration::from_secs(config.base_interval_secs),
                StdDuration::from_secs(config.max_backoff_secs),
            ),
            failure_threshold: config.failure_threshold.max(1),
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// `min(base * 2^failures, max)`
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        to_chrono(self.backoff.delay_for(failures))
    }

    /// Success resets failures and schedules the next run at the normal interval.
    pub fn record_success(&self, connection: &mut CalendarConnection, now: DateTime<Utc>) {
        connection.status = ConnectionStatus::Active;
        connection.consecutive_failures = 0;
        connection.last_sync_error = None;
        connection.last_synced_at = Some(now);
        connection.next_sync_at = now + connection.sync_settings.interval();
        connection.updated_at = now;
    }

    pub fn record_failure(
        &self,
        connection: &mut CalendarConnection,
        report: FailureReport<'_>,
        now: DateTime<Utc>,
    ) {
        connection.consecutive_failures = connection.consecutive_failures.saturating_add(1);
        connection.last_sync_error = Some(report.message.to_string());
        connection.updated_at = now;

        if report.kind == SyncErrorKind::Auth {
            warn!(
                connection_id = %connection.id,
                provider = %connection.provider,
                "authorization rejected; scheduling halted until re-authentication"
            );
            connection.status = ConnectionStatus::AuthError;
            connection.next_sync_at = now + connection.sync_settings.interval();
            return;
        }

        let failures = connection.consecutive_failures;
        let scheduled = if failures >= self.failure_threshold {
            connection.status = ConnectionStatus::SyncError;
            now + self.backoff_delay(failures)
        } else {
            // A PendingAuth connection that failed transiently keeps retrying
            // through the periodic scan, so it is promoted to Active.
            connection.status = ConnectionStatus::Active;
            now + connection.sync_settings.interval()
        };

        // A provider's retry-after replaces the computed delay, shorter or not.
        let next = match (report.kind, report.retry_after_secs) {
            (SyncErrorKind::RateLimited, Some(retry_after)) => {
                now + to_chrono(StdDuration::from_secs(retry_after))
            }
            _ => scheduled,
        };

        debug!(
            connection_id = %connection.id,
            failures,
            kind = %report.kind,
            status = %connection.status,
            next_sync_at = %next,
            "recorded sync failure"
        );
        connection.next_sync_at = next;
    }
}

fn to_chrono(duration: StdDuration) -> Duration {
    Duration::from_std(duration).unwrap_or_else(|_| Duration::days(36_500))
}
