//! In-memory port implementations

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearthsync_core::{
    ClaimFence, ConnectionRepository, CredentialStore, EventChangeSet, FeedFetcher, MirroredEventRepository,
    NotificationTransport, OAuthSessionStore, PhaseTransition, ProviderResult,
};
use hearthsync_core::{AuthorizationRequest, CalendarProviderAdapter};
use hearthsync_domain::{
    AuthorizationGrant, CalendarConnection, CalendarProvider, ChangeNotification, ConnectionKey,
    ConnectionStatus, DiscoveredCalendar, HearthSyncError, MirroredEvent, OAuthSession,
    ProviderError, RemoteEvent, Result, SessionPhase, SyncWindow, TokenSet,
};
use uuid::Uuid;

/// Connection store with compare-and-swap updates on `version`.
#[derive(Default)]
pub struct InMemoryConnections {
    rows: Mutex<HashMap<Uuid, CalendarConnection>>,
    fail_find_due: AtomicBool,
    pub update_calls: AtomicUsize,
}

impl InMemoryConnections {
    pub fn seed(&self, connection: CalendarConnection) {
        self.rows.lock().unwrap().insert(connection.id, connection);
    }

    pub fn snapshot(&self, id: Uuid) -> Option<CalendarConnection> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<CalendarConnection> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    /// Make `find_due` report a store failure.
    pub fn fail_selection(&self) {
        self.fail_find_due.store(true, Ordering::SeqCst);
    }

    /// Simulate another writer touching the row.
    pub fn bump_version(&self, id: Uuid) {
        if let Some(row) = self.rows.lock().unwrap().get_mut(&id) {
            row.version = row.version.next();
        }
    }
}

#[async_trait]
impl ConnectionRepository for InMemoryConnections {
    async fn get(&self, id: Uuid) -> Result<Option<CalendarConnection>> {
        Ok(self.snapshot(id))
    }

    async fn insert(&self, connection: &CalendarConnection) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let key = connection.key();
        let duplicate = rows
            .values()
            .any(|row| row.status != ConnectionStatus::Disconnected && row.key() == key);
        if duplicate || rows.contains_key(&connection.id) {
            return Err(HearthSyncError::ConcurrencyConflict("duplicate connection".into()));
        }
        rows.insert(connection.id, connection.clone());
        Ok(())
    }

    async fn update(&self, connection: &CalendarConnection) -> Result<CalendarConnection> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().unwrap();
        let Some(stored) = rows.get_mut(&connection.id) else {
            return Err(HearthSyncError::NotFound(format!("connection {}", connection.id)));
        };
        if stored.version != connection.version {
            return Err(HearthSyncError::ConcurrencyConflict(format!(
                "expected version {}, found {}",
                connection.version, stored.version
            )));
        }
        let mut next = connection.clone();
        next.version = connection.version.next();
        *stored = next.clone();
        Ok(next)
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<CalendarConnection>> {
        if self.fail_find_due.load(Ordering::SeqCst) {
            return Err(HearthSyncError::Database("connection store unavailable".into()));
        }
        let mut due: Vec<_> = self.all().into_iter().filter(|c| c.is_due(now)).collect();
        due.sort_by_key(|c| c.next_sync_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn find_live_by_key(&self, key: &ConnectionKey) -> Result<Option<CalendarConnection>> {
        Ok(self
            .all()
            .into_iter()
            .find(|c| c.status != ConnectionStatus::Disconnected && &c.key() == key))
    }

    async fn list_for_family(&self, family_id: Uuid) -> Result<Vec<CalendarConnection>> {
        let mut rows: Vec<_> =
            self.all().into_iter().filter(|c| c.family_id == family_id).collect();
        rows.sort_by_key(|c| c.created_at);
        Ok(rows)
    }
}

/// Mirror store that checks claim fences against the connection store.
pub struct InMemoryEvents {
    connections: Arc<InMemoryConnections>,
    rows: Mutex<HashMap<Uuid, MirroredEvent>>,
}

impl InMemoryEvents {
    pub fn new(connections: Arc<InMemoryConnections>) -> Self {
        Self { connections, rows: Mutex::new(HashMap::new()) }
    }

    /// Caller must hold the rows lock so the check and the write are atomic.
    fn check_fence(&self, fence: ClaimFence) -> Result<()> {
        match self.connections.snapshot(fence.connection_id) {
            Some(row)
                if row.version == fence.version
                    && row.status != ConnectionStatus::Disconnected =>
            {
                Ok(())
            }
            _ => Err(HearthSyncError::ConcurrencyConflict(format!(
                "claim {} on {} is gone",
                fence.version, fence.connection_id
            ))),
        }
    }

    pub fn seed(&self, event: MirroredEvent) {
        self.rows.lock().unwrap().insert(event.id, event);
    }

    pub fn for_connection(&self, connection_id: Uuid) -> Vec<MirroredEvent> {
        let mut rows: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.connection_id == connection_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        rows
    }
}

#[async_trait]
impl MirroredEventRepository for InMemoryEvents {
    async fn list_for_connection(&self, connection_id: Uuid) -> Result<Vec<MirroredEvent>> {
        Ok(self.for_connection(connection_id))
    }

    async fn apply_changes(&self, fence: ClaimFence, changes: &EventChangeSet) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        self.check_fence(fence)?;
        for event in changes.inserts.iter().chain(&changes.updates) {
            rows.insert(event.id, event.clone());
        }
        for id in &changes.deletes {
            rows.remove(id);
        }
        for id in &changes.tombstones {
            if let Some(row) = rows.get_mut(id) {
                row.deleted_locally = true;
            }
        }
        Ok(())
    }

    async fn assign_external_id(
        &self,
        fence: ClaimFence,
        event_id: Uuid,
        external_id: &str,
    ) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        self.check_fence(fence)?;
        let row = rows
            .get_mut(&event_id)
            .filter(|row| row.connection_id == fence.connection_id)
            .ok_or_else(|| HearthSyncError::NotFound(format!("event {event_id}")))?;
        row.external_id = Some(external_id.to_string());
        row.locally_modified = false;
        row.deleted_locally = false;
        Ok(())
    }

    async fn delete_for_connection(&self, connection_id: Uuid) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|_, e| e.connection_id != connection_id);
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryCredentials {
    tokens: Mutex<HashMap<Uuid, TokenSet>>,
}

impl InMemoryCredentials {
    pub fn seed(&self, connection_id: Uuid, tokens: TokenSet) {
        self.tokens.lock().unwrap().insert(connection_id, tokens);
    }

    pub fn snapshot(&self, connection_id: Uuid) -> Option<TokenSet> {
        self.tokens.lock().unwrap().get(&connection_id).cloned()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentials {
    async fn get(&self, connection_id: Uuid) -> Result<Option<TokenSet>> {
        Ok(self.snapshot(connection_id))
    }

    async fn put(&self, connection_id: Uuid, tokens: &TokenSet) -> Result<()> {
        self.seed(connection_id, tokens.clone());
        Ok(())
    }

    async fn delete(&self, connection_id: Uuid) -> Result<()> {
        self.tokens.lock().unwrap().remove(&connection_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySessions {
    sessions: Mutex<HashMap<Uuid, OAuthSession>>,
}

impl InMemorySessions {
    pub fn snapshot(&self, session_id: Uuid) -> Option<OAuthSession> {
        self.sessions.lock().unwrap().get(&session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl OAuthSessionStore for InMemorySessions {
    async fn insert(&self, session: OAuthSession) -> Result<()> {
        self.sessions.lock().unwrap().insert(session.session_id, session);
        Ok(())
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<OAuthSession>> {
        Ok(self.snapshot(session_id))
    }

    async fn find_by_state(&self, state: &str) -> Result<Option<OAuthSession>> {
        Ok(self.sessions.lock().unwrap().values().find(|s| s.state == state).cloned())
    }

    async fn transition(
        &self,
        session_id: Uuid,
        expected: SessionPhase,
        next: SessionPhase,
    ) -> Result<PhaseTransition> {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(session) = sessions.get_mut(&session_id) else {
            return Ok(PhaseTransition::Missing);
        };
        if session.phase != expected {
            return Ok(PhaseTransition::Mismatch(session.phase));
        }
        session.phase = next;
        Ok(PhaseTransition::Applied(session.clone()))
    }

    async fn save(&self, session: &OAuthSession) -> Result<()> {
        self.sessions.lock().unwrap().insert(session.session_id, session.clone());
        Ok(())
    }

    async fn remove(&self, session_id: Uuid) -> Result<()> {
        self.sessions.lock().unwrap().remove(&session_id);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        Ok(before - sessions.len())
    }
}

/// Provider adapter driven by test scripts.
pub struct ScriptedAdapter {
    provider: CalendarProvider,
    events: Mutex<Vec<RemoteEvent>>,
    calendars: Mutex<Vec<DiscoveredCalendar>>,
    fetch_error: Mutex<Option<ProviderError>>,
    push_error: Mutex<Option<ProviderError>>,
    exchange_error: Mutex<Option<ProviderError>>,
    fetch_delay: Mutex<Option<Duration>>,
    pub fetch_calls: AtomicUsize,
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub pushed: Mutex<Vec<MirroredEvent>>,
}

impl ScriptedAdapter {
    pub fn new(provider: CalendarProvider) -> Self {
        Self {
            provider,
            events: Mutex::new(Vec::new()),
            calendars: Mutex::new(vec![DiscoveredCalendar {
                external_id: "primary".into(),
                display_name: "Family".into(),
                default_color: Some("#3366ff".into()),
            }]),
            fetch_error: Mutex::new(None),
            push_error: Mutex::new(None),
            exchange_error: Mutex::new(None),
            fetch_delay: Mutex::new(None),
            fetch_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            pushed: Mutex::new(Vec::new()),
        }
    }

    pub fn set_events(&self, events: Vec<RemoteEvent>) {
        *self.events.lock().unwrap() = events;
    }

    pub fn set_calendars(&self, calendars: Vec<DiscoveredCalendar>) {
        *self.calendars.lock().unwrap() = calendars;
    }

    pub fn fail_fetch(&self, error: Option<ProviderError>) {
        *self.fetch_error.lock().unwrap() = error;
    }

    pub fn fail_push(&self, error: Option<ProviderError>) {
        *self.push_error.lock().unwrap() = error;
    }

    pub fn fail_exchange(&self, error: Option<ProviderError>) {
        *self.exchange_error.lock().unwrap() = error;
    }

    pub fn delay_fetch(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    fn grant(&self) -> AuthorizationGrant {
        AuthorizationGrant {
            tokens: TokenSet {
                refresh_token: Some("refresh-new".into()),
                ..TokenSet::bearer("access-new")
            },
            external_account_id: "parent@example.com".into(),
        }
    }
}

#[async_trait]
impl CalendarProviderAdapter for ScriptedAdapter {
    fn provider(&self) -> CalendarProvider {
        self.provider
    }

    fn authorization_url(&self, request: &AuthorizationRequest<'_>) -> ProviderResult<String> {
        Ok(format!(
            "https://auth.example.com/authorize?state={}&code_challenge={}&redirect_uri={}",
            request.state, request.code_challenge, request.redirect_uri
        ))
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _code_verifier: &str,
        _redirect_uri: &str,
    ) -> ProviderResult<AuthorizationGrant> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.exchange_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.grant())
    }

    async fn authenticate_basic(
        &self,
        username: &str,
        secret: &str,
    ) -> ProviderResult<AuthorizationGrant> {
        if secret == "wrong" {
            return Err(ProviderError::auth("invalid app-specific password"));
        }
        Ok(AuthorizationGrant {
            tokens: TokenSet {
                token_type: "Basic".into(),
                ..TokenSet::bearer(format!("{username}:{secret}"))
            },
            external_account_id: username.to_string(),
        })
    }

    async fn list_calendars(&self, _tokens: &TokenSet) -> ProviderResult<Vec<DiscoveredCalendar>> {
        Ok(self.calendars.lock().unwrap().clone())
    }

    async fn fetch_events(
        &self,
        _tokens: Option<&TokenSet>,
        _calendar_id: &str,
        _window: SyncWindow,
    ) -> ProviderResult<Vec<RemoteEvent>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.fetch_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.events.lock().unwrap().clone())
    }

    async fn push_event(
        &self,
        _tokens: &TokenSet,
        _calendar_id: &str,
        event: &MirroredEvent,
    ) -> ProviderResult<String> {
        if let Some(err) = self.push_error.lock().unwrap().clone() {
            return Err(err);
        }
        let mut pushed = self.pushed.lock().unwrap();
        pushed.push(event.clone());
        Ok(format!("pushed-{}", pushed.len()))
    }

    async fn refresh_token(&self, tokens: &TokenSet) -> ProviderResult<TokenSet> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(TokenSet {
            access_token: "access-refreshed".into(),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            ..tokens.clone()
        })
    }
}

/// Feed fetcher returning a fixed body per URL.
#[derive(Default)]
pub struct StaticFeedFetcher {
    bodies: Mutex<HashMap<String, String>>,
}

impl StaticFeedFetcher {
    pub fn serve(&self, url: &str, body: &str) {
        self.bodies.lock().unwrap().insert(url.to_string(), body.to_string());
    }
}

#[async_trait]
impl FeedFetcher for StaticFeedFetcher {
    async fn fetch_text(&self, url: &str) -> ProviderResult<String> {
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| ProviderError::unknown(format!("HTTP 404 for {url}")))
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    published: Mutex<Vec<ChangeNotification>>,
}

impl RecordingTransport {
    pub fn published(&self) -> Vec<ChangeNotification> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn publish_to_family(
        &self,
        _family_id: Uuid,
        notification: &ChangeNotification,
    ) -> Result<()> {
        self.published.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
