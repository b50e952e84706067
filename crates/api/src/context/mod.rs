//! Application context - dependency injection container

use std::sync::Arc;
use std::time::Duration;

use hearthsync_common::{SharedClock, SystemClock};
use hearthsync_core::{
    BackgroundSyncTrigger, BatchLimits, CalendarConnectionsApi, ChangeNotifier,
    ConnectionLifecycleService, ConnectionSyncService, FailureBackoffManager, FeedFetcher,
    IcsValidator, LifecycleDependencies, OAuthDependencies, OAuthSessionService,
    OperationPipeline, SyncBatchRunner, SyncDependencies, SyncOptions, SyncTrigger,
};
use hearthsync_domain::constants::ICS_VALIDATION_TIMEOUT_SECS;
use hearthsync_domain::{Config, HearthSyncError, Result};
use hearthsync_infra::{
    build_registry, BroadcastTransport, DbManager, HttpClient, HttpFeedFetcher,
    InMemorySessionStore, SchedulerError, SqliteConnectionRepository, SqliteCredentialStore,
    SqliteMirroredEventRepository, SyncMetrics, SyncScheduler, SyncSchedulerConfig,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: Config,
    pub db: DbManager,
    pub api: Arc<CalendarConnectionsApi>,
    pub notifications: Arc<BroadcastTransport>,
    pub metrics: Arc<SyncMetrics>,
    scheduler: Mutex<SyncScheduler>,
}

impl AppContext {
    /// Open the database, run migrations and wire every service.
    ///
    /// The scheduler is built but not started; see [`Self::start_scheduler`].
    pub fn new(config: Config) -> Result<Self> {
        let db = DbManager::from_config(&config.database)?;
        db.run_migrations()?;

        let clock: SharedClock = Arc::new(SystemClock);
        let connections = Arc::new(SqliteConnectionRepository::new(db.clone()));
        let events = Arc::new(SqliteMirroredEventRepository::new(db.clone()));
        let credentials = Arc::new(SqliteCredentialStore::new(db.clone()));
        let sessions = Arc::new(InMemorySessionStore::new());

        let options = SyncOptions::from(&config.scheduler);
        let http = HttpClient::builder().timeout(options.provider_timeout).build()?;
        let fetcher: Arc<dyn FeedFetcher> = Arc::new(HttpFeedFetcher::new(http.clone()));
        let providers = Arc::new(build_registry(&config, &http, Arc::clone(&fetcher)));

        let notifications = Arc::new(BroadcastTransport::from_config(&config.notifier));
        let notifier = Arc::new(ChangeNotifier::new(
            notifications.clone(),
            Duration::from_millis(config.notifier.publish_timeout_ms),
        ));

        let provider_timeout = options.provider_timeout;
        let sync = Arc::new(ConnectionSyncService::new(
            SyncDependencies {
                connections: connections.clone(),
                events: events.clone(),
                credentials: credentials.clone(),
                providers: providers.clone(),
                notifier,
                clock: clock.clone(),
            },
            FailureBackoffManager::new(&config.backoff),
            options,
        ));
        let trigger: Arc<dyn SyncTrigger> = Arc::new(BackgroundSyncTrigger::new(sync.clone()));

        let oauth = Arc::new(OAuthSessionService::new(
            OAuthDependencies {
                sessions,
                providers,
                connections: connections.clone(),
                credentials: credentials.clone(),
                trigger: trigger.clone(),
                clock: clock.clone(),
            },
            Duration::from_secs(config.oauth.session_ttl_secs),
            provider_timeout,
        ));
        let ics = Arc::new(IcsValidator::new(
            fetcher,
            Duration::from_secs(ICS_VALIDATION_TIMEOUT_SECS).min(provider_timeout),
        ));
        let lifecycle = Arc::new(ConnectionLifecycleService::new(LifecycleDependencies {
            connections: connections.clone(),
            events,
            credentials,
            sync: sync.clone(),
            trigger,
            ics: ics.clone(),
            clock: clock.clone(),
        }));
        let api = Arc::new(CalendarConnectionsApi::new(
            oauth.clone(),
            lifecycle,
            ics,
            OperationPipeline::standard(),
        ));

        let runner = Arc::new(SyncBatchRunner::new(
            connections,
            sync,
            clock,
            BatchLimits::from(&config.scheduler),
        ));
        let metrics = Arc::new(SyncMetrics::new());
        let scheduler = SyncScheduler::new(
            SyncSchedulerConfig::from(&config.scheduler),
            runner,
            oauth,
            metrics.clone(),
        )
        .map_err(HearthSyncError::from)?;

        info!(db = %db.path().display(), "application context ready");
        Ok(Self { config, db, api, notifications, metrics, scheduler: Mutex::new(scheduler) })
    }

    /// Start periodic syncing unless the configuration disables it.
    pub async fn start_scheduler(&self) -> Result<()> {
        if !self.config.scheduler.enabled {
            info!("sync scheduler disabled by configuration");
            return Ok(());
        }
        self.scheduler.lock().await.start().await.map_err(HearthSyncError::from)
    }

    /// Run one scheduler tick now, outside the cron schedule.
    pub async fn run_sync_tick(&self) {
        self.scheduler.lock().await.run_now().await;
    }

    /// Stop the scheduler if it is running.
    pub async fn shutdown(&self) {
        let mut scheduler = self.scheduler.lock().await;
        match scheduler.stop().await {
            Ok(()) | Err(SchedulerError::NotRunning) => {}
            Err(err) => warn!(error = %err, "sync scheduler did not stop cleanly"),
        }
    }

    pub async fn scheduler_running(&self) -> bool {
        self.scheduler.lock().await.is_running()
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("db", &self.db.path())
            .field("scheduler_enabled", &self.config.scheduler.enabled)
            .finish_non_exhaustive()
    }
}
