//! Cron-driven connection sync scheduler.
//!
//! Each tick runs one [`SyncBatchRunner`] pass and then purges expired OAuth
//! sessions. Join handles are tracked, cancellation is explicit, and every
//! tick is wrapped in a timeout. A tick that fires while the previous one is
//! still running is skipped.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hearthsync_infra::observability::SyncMetrics;
//! use hearthsync_infra::scheduling::{SchedulerResult, SyncScheduler, SyncSchedulerConfig};
//!
//! # async fn example(
//! #     runner: Arc<hearthsync_core::SyncBatchRunner>,
//! #     oauth: Arc<hearthsync_core::OAuthSessionService>,
//! # ) -> SchedulerResult<()> {
//! let mut scheduler = SyncScheduler::new(
//!     SyncSchedulerConfig::default(),
//!     runner,
//!     oauth,
//!     Arc::new(SyncMetrics::new()),
//! )?;
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hearthsync_core::{OAuthSessionService, SyncBatchRunner};
use hearthsync_domain::constants::DEFAULT_SCHEDULER_CRON;
use hearthsync_domain::SchedulerSettings;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::observability::SyncMetrics;
use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Configuration for the sync scheduler.
#[derive(Debug, Clone)]
pub struct SyncSchedulerConfig {
    /// Six-field cron expression (seconds first).
    pub cron_expression: String,
    /// Upper bound on one tick, batch and purge included.
    pub job_timeout: Duration,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    pub join_timeout: Duration,
}

impl Default for SyncSchedulerConfig {
    fn default() -> Self {
        Self {
            cron_expression: DEFAULT_SCHEDULER_CRON.to_string(),
            job_timeout: Duration::from_secs(15 * 60),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&SchedulerSettings> for SyncSchedulerConfig {
    /// A tick may run as long as a claim lease; after that the claimed
    /// connections become due again anyway.
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            cron_expression: settings.cron_expression.clone(),
            job_timeout: Duration::from_secs(settings.claim_lease_secs.max(1)),
            ..Self::default()
        }
    }
}

struct TickContext {
    runner: Arc<SyncBatchRunner>,
    oauth: Arc<OAuthSessionService>,
    metrics: Arc<SyncMetrics>,
    job_timeout: Duration,
    in_flight: AtomicBool,
}

/// Periodic sync scheduler with explicit lifecycle management.
pub struct SyncScheduler {
    scheduler: Option<JobScheduler>,
    config: SyncSchedulerConfig,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
    context: Arc<TickContext>,
}

impl SyncScheduler {
    pub fn new(
        config: SyncSchedulerConfig,
        runner: Arc<SyncBatchRunner>,
        oauth: Arc<OAuthSessionService>,
        metrics: Arc<SyncMetrics>,
    ) -> SchedulerResult<Self> {
        validate_cron(&config.cron_expression)?;
        let context = Arc::new(TickContext {
            runner,
            oauth,
            metrics,
            job_timeout: config.job_timeout,
            in_flight: AtomicBool::new(false),
        });
        Ok(Self {
            scheduler: None,
            config,
            monitor_handle: None,
            cancellation: CancellationToken::new(),
            context,
        })
    }

    /// Start the scheduler, spawning the monitoring task.
    #[instrument(skip(self), fields(cron = %self.config.cron_expression))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler_instance = self.build_scheduler().await?;
        let start_timeout = self.config.start_timeout;

        tokio::time::timeout(start_timeout, scheduler_instance.start())
            .await
            .map_err(|source| SchedulerError::Timeout { duration: start_timeout, source })?
            .map_err(|source| SchedulerError::StartFailed { source })?;

        self.scheduler = Some(scheduler_instance);

        let cancel = self.cancellation.clone();
        let metrics = self.context.metrics.clone();
        self.monitor_handle = Some(tokio::spawn(async move {
            cancel.cancelled().await;
            let snapshot = metrics.snapshot();
            debug!(?snapshot, "sync scheduler monitor exiting");
        }));

        info!("sync scheduler started");
        Ok(())
    }

    /// Stop the scheduler. In-flight batches stop dispatching new
    /// connections; syncs already running finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        let Some(mut scheduler) = self.scheduler.take() else {
            return Err(SchedulerError::NotRunning);
        };

        self.cancellation.cancel();

        let stop_timeout = self.config.stop_timeout;
        tokio::time::timeout(stop_timeout, async move { scheduler.shutdown().await })
            .await
            .map_err(|source| SchedulerError::Timeout { duration: stop_timeout, source })?
            .map_err(|source| SchedulerError::StopFailed { source })?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|source| SchedulerError::Timeout { duration: join_timeout, source })??;
        }

        info!("sync scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    pub fn metrics(&self) -> Arc<SyncMetrics> {
        self.context.metrics.clone()
    }

    /// Run one tick immediately, outside the cron schedule.
    pub async fn run_now(&self) {
        run_tick(&self.context, &self.cancellation).await;
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler =
            JobScheduler::new().await.map_err(|source| SchedulerError::CreationFailed { source })?;

        let context = self.context.clone();
        let cancel = self.cancellation.clone();
        let job = Job::new_async(self.config.cron_expression.as_str(), move |_id, _lock| {
            let context = context.clone();
            let cancel = cancel.clone();
            Box::pin(async move {
                run_tick(&context, &cancel).await;
            })
        })
        .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        let job_id = job.guid();
        scheduler
            .add(job)
            .await
            .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        debug!(cron = %self.config.cron_expression, %job_id, "registered sync job");
        Ok(scheduler)
    }
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SyncScheduler dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

async fn run_tick(context: &TickContext, cancel: &CancellationToken) {
    if cancel.is_cancelled() {
        return;
    }
    if context.in_flight.swap(true, Ordering::AcqRel) {
        debug!("previous sync tick still running; skipping");
        return;
    }
    let _guard = InFlightGuard(&context.in_flight);

    let started = Instant::now();
    let work = async {
        let batch = context.runner.run_once(cancel).await;
        let purged = context.oauth.purge_expired().await;
        (batch, purged)
    };

    match tokio::time::timeout(context.job_timeout, work).await {
        Ok((batch, purged)) => {
            match batch {
                Ok(summary) => {
                    context.metrics.record_batch(&summary, started.elapsed());
                    debug!(
                        selected = summary.selected,
                        elapsed_ms = started.elapsed().as_millis(),
                        "sync tick finished"
                    );
                }
                Err(err) => {
                    context.metrics.record_run_error(started.elapsed());
                    error!(error = %err, "sync batch failed");
                }
            }
            match purged {
                Ok(count) if count > 0 => {
                    context.metrics.record_sessions_purged(count);
                    debug!(count, "purged expired OAuth sessions");
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "OAuth session purge failed"),
            }
        }
        Err(_) => {
            context.metrics.record_timeout();
            warn!(timeout_secs = context.job_timeout.as_secs(), "sync tick timed out");
        }
    }

    let snapshot = context.metrics.snapshot();
    debug!(
        runs = snapshot.runs,
        attempts = snapshot.attempts,
        failures = snapshot.failures,
        conflicts = snapshot.conflicts,
        timeouts = snapshot.timeouts,
        "sync metrics"
    );
}

/// Clears the in-flight flag even if the tick future is dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn validate_cron(expression: &str) -> SchedulerResult<()> {
    let fields = expression.split_whitespace().count();
    if (6..=7).contains(&fields) {
        Ok(())
    } else {
        Err(SchedulerError::InvalidCron {
            expression: expression.to_string(),
            reason: format!("expected 6 or 7 fields (seconds first), got {fields}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cron_needs_a_seconds_field() {
        assert!(validate_cron(DEFAULT_SCHEDULER_CRON).is_ok());
        assert!(validate_cron("0 0 */2 * * * 2030").is_ok());
        assert!(matches!(validate_cron("*/5 * * * *"), Err(SchedulerError::InvalidCron { .. })));
    }

    #[test]
    fn job_timeout_follows_claim_lease() {
        let settings = SchedulerSettings { claim_lease_secs: 90, ..SchedulerSettings::default() };
        let config = SyncSchedulerConfig::from(&settings);
        assert_eq!(config.job_timeout, Duration::from_secs(90));
        assert_eq!(config.cron_expression, settings.cron_expression);
    }
}
