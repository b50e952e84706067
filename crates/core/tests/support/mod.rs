//! Shared test helpers for `hearthsync-core` integration tests.
//!
//! In-memory ports with the same concurrency semantics as the SQLite
//! adapters, a scripted provider adapter, and a harness wiring them together.

#![allow(dead_code)]

pub mod fakes;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use hearthsync_common::MockClock;
use hearthsync_core::{
    BatchLimits, CalendarConnectionsApi, ChangeNotifier, ConnectionLifecycleService,
    ConnectionSyncService, FailureBackoffManager, IcsValidator, LifecycleDependencies,
    NoopSyncTrigger, OAuthDependencies, OAuthSessionService, OperationPipeline, ProviderRegistry,
    SyncBatchRunner, SyncDependencies, SyncOptions, SyncTrigger,
};
use hearthsync_domain::{
    BackoffConfig, CalendarConnection, CalendarProvider, ConnectionStatus, RemoteEvent, TokenSet,
};
use uuid::Uuid;

pub use fakes::{
    InMemoryConnections, InMemoryCredentials, InMemoryEvents, InMemorySessions,
    RecordingTransport, ScriptedAdapter, StaticFeedFetcher,
};

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).single().unwrap_or_default()
}

pub fn remote_event(external_id: &str, title: &str, now: DateTime<Utc>) -> RemoteEvent {
    RemoteEvent {
        external_id: external_id.to_string(),
        title: title.to_string(),
        start_time: now + chrono::Duration::days(1),
        end_time: now + chrono::Duration::days(1) + chrono::Duration::hours(1),
        is_all_day: false,
        location: None,
        description: None,
        is_declined: false,
        color: None,
    }
}

/// Fully wired engine over in-memory ports.
pub struct Harness {
    pub clock: Arc<MockClock>,
    pub connections: Arc<InMemoryConnections>,
    pub events: Arc<InMemoryEvents>,
    pub credentials: Arc<InMemoryCredentials>,
    pub sessions: Arc<InMemorySessions>,
    pub transport: Arc<RecordingTransport>,
    pub google: Arc<ScriptedAdapter>,
    pub icloud: Arc<ScriptedAdapter>,
    pub feed: Arc<StaticFeedFetcher>,
    pub sync: Arc<ConnectionSyncService>,
    pub oauth: Arc<OAuthSessionService>,
    pub lifecycle: Arc<ConnectionLifecycleService>,
    pub ics: Arc<IcsValidator>,
    pub backoff: BackoffConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_backoff(BackoffConfig::default())
    }

    pub fn with_backoff(backoff: BackoffConfig) -> Self {
        let clock = Arc::new(MockClock::at(fixed_now()));
        let connections = Arc::new(InMemoryConnections::default());
        let events = Arc::new(InMemoryEvents::new(Arc::clone(&connections)));
        let credentials = Arc::new(InMemoryCredentials::default());
        let sessions = Arc::new(InMemorySessions::default());
        let transport = Arc::new(RecordingTransport::default());
        let google = Arc::new(ScriptedAdapter::new(CalendarProvider::Google));
        let icloud = Arc::new(ScriptedAdapter::new(CalendarProvider::ICloud));
        let ics_adapter = Arc::new(ScriptedAdapter::new(CalendarProvider::IcsUrl));
        let feed = Arc::new(StaticFeedFetcher::default());

        let providers = Arc::new(
            ProviderRegistry::new()
                .with(Arc::clone(&google) as _)
                .with(Arc::clone(&icloud) as _)
                .with(ics_adapter as _),
        );
        let notifier =
            Arc::new(ChangeNotifier::new(Arc::clone(&transport) as _, Duration::from_millis(200)));

        let sync = Arc::new(ConnectionSyncService::new(
            SyncDependencies {
                connections: Arc::clone(&connections) as _,
                events: Arc::clone(&events) as _,
                credentials: Arc::clone(&credentials) as _,
                providers: Arc::clone(&providers),
                notifier,
                clock: Arc::clone(&clock) as _,
            },
            FailureBackoffManager::new(&backoff),
            SyncOptions {
                provider_timeout: Duration::from_millis(500),
                claim_lease: Duration::from_secs(900),
            },
        ));

        let trigger: Arc<dyn SyncTrigger> = Arc::new(NoopSyncTrigger);
        let oauth = Arc::new(OAuthSessionService::new(
            OAuthDependencies {
                sessions: Arc::clone(&sessions) as _,
                providers: Arc::clone(&providers),
                connections: Arc::clone(&connections) as _,
                credentials: Arc::clone(&credentials) as _,
                trigger: Arc::clone(&trigger),
                clock: Arc::clone(&clock) as _,
            },
            Duration::from_secs(600),
            Duration::from_millis(500),
        ));

        let ics = Arc::new(IcsValidator::new(Arc::clone(&feed) as _, Duration::from_millis(500)));
        let lifecycle = Arc::new(ConnectionLifecycleService::new(LifecycleDependencies {
            connections: Arc::clone(&connections) as _,
            events: Arc::clone(&events) as _,
            credentials: Arc::clone(&credentials) as _,
            sync: Arc::clone(&sync),
            trigger,
            ics: Arc::clone(&ics),
            clock: Arc::clone(&clock) as _,
        }));

        Self {
            clock,
            connections,
            events,
            credentials,
            sessions,
            transport,
            google,
            icloud,
            feed,
            sync,
            oauth,
            lifecycle,
            ics,
            backoff,
        }
    }

    pub fn batch_runner(&self, batch_limit: usize, max_concurrency: usize) -> SyncBatchRunner {
        SyncBatchRunner::new(
            Arc::clone(&self.connections) as _,
            Arc::clone(&self.sync),
            Arc::clone(&self.clock) as _,
            BatchLimits { batch_limit, max_concurrency },
        )
    }

    pub fn api(&self) -> CalendarConnectionsApi {
        CalendarConnectionsApi::new(
            Arc::clone(&self.oauth),
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.ics),
            OperationPipeline::standard(),
        )
    }

    /// Store an Active Google connection with valid credentials.
    pub fn seed_google(&self, family_id: Uuid, calendar_id: &str) -> CalendarConnection {
        let now = fixed_now();
        let mut connection = CalendarConnection::new(
            family_id,
            CalendarProvider::Google,
            "parent@example.com",
            calendar_id,
            calendar_id,
            now,
        );
        connection.status = ConnectionStatus::Active;
        self.connections.seed(connection.clone());
        self.credentials.seed(
            connection.id,
            TokenSet {
                expires_at: Some(now + chrono::Duration::hours(1)),
                refresh_token: Some("refresh-1".into()),
                ..TokenSet::bearer("access-1")
            },
        );
        connection
    }

    pub fn stored(&self, connection_id: Uuid) -> CalendarConnection {
        self.connections.snapshot(connection_id).unwrap_or_else(|| {
            panic!("connection {connection_id} missing from the in-memory store")
        })
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
