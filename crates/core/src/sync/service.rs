//! Single-connection sync: claim, fetch, reconcile, persist, push, record

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use hearthsync_common::{redact_identifier, SharedClock};
use hearthsync_domain::constants::TOKEN_REFRESH_THRESHOLD_SECS;
use hearthsync_domain::{
    CalendarConnection, ConnectionStatus, HearthSyncError, ProviderError, Result,
    SchedulerSettings, SyncErrorKind, SyncOutcome, TokenSet,
};
use tracing::{debug, info, instrument, warn};

use super::backoff::{FailureBackoffManager, FailureReport};
use super::notifier::ChangeNotifier;
use super::reconcile::ReconciliationEngine;
use crate::connections::ports::{
    ClaimFence, ConnectionRepository, CredentialStore, MirroredEventRepository,
};
use crate::providers::{CalendarProviderAdapter, ProviderRegistry};

/// Why a connection was not synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another worker holds the claim (version moved underneath us).
    AlreadyClaimed,
    Disabled,
    NotSyncable(ConnectionStatus),
}

/// Result of asking for one connection to be synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAttempt {
    Completed(SyncOutcome),
    Skipped(SkipReason),
}

impl SyncAttempt {
    pub fn outcome(&self) -> Option<&SyncOutcome> {
        match self {
            Self::Completed(outcome) => Some(outcome),
            Self::Skipped(_) => None,
        }
    }
}

/// Timing knobs for one sync.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub provider_timeout: Duration,
    pub claim_lease: Duration,
}

impl From<&SchedulerSettings> for SyncOptions {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            provider_timeout: Duration::from_secs(settings.provider_timeout_secs),
            claim_lease: Duration::from_secs(settings.claim_lease_secs),
        }
    }
}

/// Collaborators of [`ConnectionSyncService`].
pub struct SyncDependencies {
    pub connections: Arc<dyn ConnectionRepository>,
    pub events: Arc<dyn MirroredEventRepository>,
    pub credentials: Arc<dyn CredentialStore>,
    pub providers: Arc<ProviderRegistry>,
    pub notifier: Arc<ChangeNotifier>,
    pub clock: SharedClock,
}

/// Runs one sync attempt for one connection.
///
/// Mutual exclusion comes from the claim: a version-checked write that pushes
/// `next_sync_at` out by the claim lease. Only the worker whose claim lands
/// proceeds; a crashed worker's connection becomes due again when the lease
/// runs out.
pub struct ConnectionSyncService {
    deps: SyncDependencies,
    engine: ReconciliationEngine,
    backoff: FailureBackoffManager,
    options: SyncOptions,
}

impl ConnectionSyncService {
    pub fn new(deps: SyncDependencies, backoff: FailureBackoffManager, options: SyncOptions) -> Self {
        Self { deps, engine: ReconciliationEngine::new(), backoff, options }
    }

    pub fn backoff(&self) -> &FailureBackoffManager {
        &self.backoff
    }

    /// Sync `connection` (as last read) if it can be claimed.
    ///
    /// Provider failures are recorded on the connection and reported in the
    /// outcome. Only entity-store failures are returned as `Err`.
    #[instrument(skip_all, fields(connection_id = %connection.id, provider = %connection.provider))]
    pub async fn sync_connection(&self, connection: CalendarConnection) -> Result<SyncAttempt> {
        if !connection.is_enabled {
            return Ok(SyncAttempt::Skipped(SkipReason::Disabled));
        }
        if !connection.status.is_syncable() {
            return Ok(SyncAttempt::Skipped(SkipReason::NotSyncable(connection.status)));
        }

        let Some(claimed) = self.claim(connection).await? else {
            return Ok(SyncAttempt::Skipped(SkipReason::AlreadyClaimed));
        };

        let outcome = match self.execute(&claimed).await {
            Ok(outcome) => outcome,
            Err(HearthSyncError::ConcurrencyConflict(reason)) => {
                debug!(%reason, "claim lost while writing mirrors; result dropped");
                return Ok(SyncAttempt::Skipped(SkipReason::AlreadyClaimed));
            }
            Err(HearthSyncError::Provider(err)) => SyncOutcome {
                retry_after_secs: err.retry_after_secs,
                ..SyncOutcome::failed(claimed.id, err.kind, err.message.clone())
            },
            Err(err) if err.is_store_failure() => return Err(err),
            Err(err) => SyncOutcome::failed(claimed.id, SyncErrorKind::Unknown, err.to_string()),
        };

        self.record_result(claimed, &outcome).await?;

        if outcome.success {
            info!(
                added = outcome.events_added,
                updated = outcome.events_updated,
                deleted = outcome.events_deleted,
                pushed = outcome.events_pushed,
                "connection synced"
            );
        } else {
            warn!(
                kind = ?outcome.error_kind,
                error = outcome.error_message.as_deref().unwrap_or_default(),
                "connection sync failed"
            );
        }

        Ok(SyncAttempt::Completed(outcome))
    }

    async fn claim(&self, mut connection: CalendarConnection) -> Result<Option<CalendarConnection>> {
        let now = self.deps.clock.now();
        connection.next_sync_at = now + to_chrono(self.options.claim_lease);
        connection.updated_at = now;
        match self.deps.connections.update(&connection).await {
            Ok(claimed) => Ok(Some(claimed)),
            Err(HearthSyncError::ConcurrencyConflict(_)) => {
                debug!("connection claimed by another worker; skipping");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn execute(&self, connection: &CalendarConnection) -> Result<SyncOutcome> {
        let fence = ClaimFence::of(connection);
        let adapter = self.deps.providers.get(connection.provider)?;
        let tokens = self.usable_tokens(adapter.as_ref(), connection).await?;
        let now = self.deps.clock.now();
        let window = connection.sync_settings.window(now);

        let remote = self
            .bounded(
                "fetch_events",
                adapter.fetch_events(tokens.as_ref(), &connection.external_calendar_id, window),
            )
            .await?;

        let existing = self.deps.events.list_for_connection(connection.id).await?;
        let plan = self.engine.reconcile(connection, &remote, &existing, now);
        debug!(
            remote = remote.len(),
            existing = existing.len(),
            filtered_out = plan.filtered_out,
            "reconciled remote events"
        );

        if !plan.changes.is_empty() {
            self.deps.events.apply_changes(fence, &plan.changes).await?;
        }

        let mut outcome = SyncOutcome {
            events_added: plan.counts.added,
            events_updated: plan.counts.updated,
            events_deleted: plan.counts.deleted,
            ..SyncOutcome::succeeded(connection.id)
        };

        if let Some(tokens) = tokens.as_ref() {
            for event in &plan.pending_push {
                let pushed = self
                    .bounded(
                        "push_event",
                        adapter.push_event(tokens, &connection.external_calendar_id, event),
                    )
                    .await;
                match pushed {
                    Ok(external_id) => {
                        self.deps.events.assign_external_id(fence, event.id, &external_id).await?;
                        outcome.events_pushed += 1;
                    }
                    Err(err) => {
                        warn!(event_id = %event.id, error = %err, "push of local event failed");
                        outcome.push_failures += 1;
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Stored credentials, refreshed first when they are about to expire.
    async fn usable_tokens(
        &self,
        adapter: &dyn CalendarProviderAdapter,
        connection: &CalendarConnection,
    ) -> Result<Option<TokenSet>> {
        if !connection.provider.requires_credentials() {
            return Ok(None);
        }

        let tokens = self
            .deps
            .credentials
            .get(connection.id)
            .await?
            .ok_or_else(|| ProviderError::auth("no credentials stored for connection"))?;

        let now = self.deps.clock.now();
        let threshold = ChronoDuration::seconds(TOKEN_REFRESH_THRESHOLD_SECS);
        if !tokens.expires_within(now, threshold) {
            return Ok(Some(tokens));
        }

        if tokens.refresh_token.is_none() {
            if tokens.expires_within(now, ChronoDuration::zero()) {
                return Err(ProviderError::auth("access token expired and no refresh token").into());
            }
            return Ok(Some(tokens));
        }

        debug!(
            account = %redact_identifier(&connection.external_account_id),
            "refreshing access token"
        );
        let refreshed = self.bounded("refresh_token", adapter.refresh_token(&tokens)).await?;
        self.deps.credentials.put(connection.id, &refreshed).await?;
        Ok(Some(refreshed))
    }

    /// Every provider call is bounded; running out of time is transient.
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> std::result::Result<T, ProviderError>
    where
        F: Future<Output = std::result::Result<T, ProviderError>>,
    {
        tokio::time::timeout(self.options.provider_timeout, call).await.unwrap_or_else(|_| {
            Err(ProviderError::transient(format!(
                "{operation} timed out after {}s",
                self.options.provider_timeout.as_secs()
            )))
        })
    }

    /// Version-checked status write.
    ///
    /// On a conflict the outcome is re-applied once, and only if the fresh
    /// copy still carries this worker's claim. A pause, resume, re-auth or
    /// disconnect in the meantime wins and the result is dropped.
    async fn record_result(&self, claimed: CalendarConnection, outcome: &SyncOutcome) -> Result<()> {
        let mut current = claimed.clone();
        for attempt in 0..2 {
            let mut next = current.clone();
            self.apply_outcome(&mut next, outcome);
            match self.deps.connections.update(&next).await {
                Ok(stored) => {
                    if outcome.success {
                        self.deps.notifier.notify(stored.family_id, outcome).await;
                    }
                    return Ok(());
                }
                Err(HearthSyncError::ConcurrencyConflict(_)) if attempt == 0 => {
                    let Some(fresh) = self.deps.connections.get(current.id).await? else {
                        return Ok(());
                    };
                    if !still_claimed(&fresh, &claimed) {
                        debug!(status = %fresh.status, "connection changed during sync; result dropped");
                        if outcome.success && fresh.status != ConnectionStatus::Disconnected {
                            self.deps.notifier.notify(fresh.family_id, outcome).await;
                        }
                        return Ok(());
                    }
                    current = fresh;
                }
                Err(HearthSyncError::ConcurrencyConflict(_)) => {
                    warn!("connection kept changing during sync; status write skipped");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn apply_outcome(&self, connection: &mut CalendarConnection, outcome: &SyncOutcome) {
        let now = self.deps.clock.now();
        if outcome.success {
            self.backoff.record_success(connection, now);
        } else {
            self.backoff.record_failure(
                connection,
                FailureReport {
                    kind: outcome.error_kind.unwrap_or(SyncErrorKind::Unknown),
                    message: outcome.error_message.as_deref().unwrap_or("sync failed"),
                    retry_after_secs: outcome.retry_after_secs,
                },
                now,
            );
        }
    }
}

/// Whether `fresh` still shows the claim written before the sync started.
fn still_claimed(fresh: &CalendarConnection, claimed: &CalendarConnection) -> bool {
    fresh.is_enabled
        && fresh.status == claimed.status
        && fresh.next_sync_at == claimed.next_sync_at
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::days(1))
}
