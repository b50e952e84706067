//! OAuth session lifecycle: initiate, complete, materialize
//!
//! A session is consumed exactly once by completion and exactly once by
//! materialization. Both steps flip the session phase atomically in the
//! store before doing any provider or repository work.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use hearthsync_common::auth::{constant_time_eq, PkceChallenge};
use hearthsync_common::{redact_identifier, SharedClock};
use hearthsync_domain::{
    CalendarConnection, CalendarProvider, CalendarSelection, ConnectionStatus, HearthSyncError,
    OAuthSession, ProviderError, Result, SessionPhase, TokenSet,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::ports::{OAuthSessionStore, PhaseTransition};
use crate::connections::ports::{ConnectionRepository, CredentialStore};
use crate::providers::{AuthorizationRequest, CalendarProviderAdapter, ProviderRegistry};
use crate::sync::SyncTrigger;

/// Returned by [`OAuthSessionService::initiate_session`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatedSession {
    pub session_id: Uuid,
    pub authorization_url: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Collaborators of [`OAuthSessionService`].
pub struct OAuthDependencies {
    pub sessions: Arc<dyn OAuthSessionStore>,
    pub providers: Arc<ProviderRegistry>,
    pub connections: Arc<dyn ConnectionRepository>,
    pub credentials: Arc<dyn CredentialStore>,
    pub trigger: Arc<dyn SyncTrigger>,
    pub clock: SharedClock,
}

pub struct OAuthSessionService {
    deps: OAuthDependencies,
    session_ttl: ChronoDuration,
    provider_timeout: Duration,
}

impl OAuthSessionService {
    pub fn new(deps: OAuthDependencies, session_ttl: Duration, provider_timeout: Duration) -> Self {
        Self {
            deps,
            session_ttl: ChronoDuration::from_std(session_ttl)
                .unwrap_or_else(|_| ChronoDuration::minutes(10)),
            provider_timeout,
        }
    }

    /// Start an authorization for an OAuth provider.
    #[instrument(skip(self, redirect_uri), fields(%provider))]
    pub async fn initiate_session(
        &self,
        family_id: Uuid,
        provider: CalendarProvider,
        redirect_uri: &str,
    ) -> Result<InitiatedSession> {
        if !provider.uses_oauth() {
            return Err(HearthSyncError::Validation(format!(
                "provider {provider} does not use OAuth"
            )));
        }
        validate_redirect_uri(redirect_uri)?;
        let adapter = self.deps.providers.get(provider)?;

        let pkce = PkceChallenge::generate();
        let authorization_url = adapter.authorization_url(&AuthorizationRequest {
            state: &pkce.state,
            code_challenge: &pkce.code_challenge,
            redirect_uri,
        })?;

        let now = self.deps.clock.now();
        let session = OAuthSession {
            session_id: Uuid::new_v4(),
            family_id,
            provider,
            state: pkce.state,
            code_verifier: pkce.code_verifier,
            redirect_uri: redirect_uri.to_string(),
            phase: SessionPhase::Initiated,
            discovered_calendars: Vec::new(),
            tokens: None,
            external_account_id: None,
            created_at: now,
            expires_at: now + self.session_ttl,
        };
        let initiated = InitiatedSession {
            session_id: session.session_id,
            authorization_url,
            expires_at: session.expires_at,
        };
        self.deps.sessions.insert(session).await?;

        info!(session_id = %initiated.session_id, "oauth session initiated");
        Ok(initiated)
    }

    /// Complete a session from the provider callback parameters.
    #[instrument(skip(self, code, state, redirect_uri))]
    pub async fn complete_session(
        &self,
        session_id: Uuid,
        code: &str,
        state: &str,
        redirect_uri: &str,
    ) -> Result<OAuthSession> {
        let session = self.live_session(session_id).await?;

        if !constant_time_eq(session.state.as_bytes(), state.as_bytes()) {
            return Err(HearthSyncError::StateMismatch(
                "state does not match the issued authorization".into(),
            ));
        }
        if session.redirect_uri != redirect_uri {
            return Err(HearthSyncError::RedirectUriMismatch(
                "redirect URI differs from the one used at initiation".into(),
            ));
        }

        let mut session = match self
            .deps
            .sessions
            .transition(session_id, SessionPhase::Initiated, SessionPhase::Completed)
            .await?
        {
            PhaseTransition::Applied(session) => session,
            PhaseTransition::Missing => {
                return Err(HearthSyncError::InvalidSession("session not found".into()))
            }
            PhaseTransition::Mismatch(_) => {
                return Err(HearthSyncError::SessionAlreadyConsumed(
                    "authorization code already redeemed for this session".into(),
                ))
            }
        };

        let adapter = self.deps.providers.get(session.provider)?;
        let enriched = self.exchange_and_discover(adapter.as_ref(), &session, code).await;
        match enriched {
            Ok((tokens, account_id, calendars)) => {
                session.tokens = Some(tokens);
                session.external_account_id = Some(account_id);
                session.discovered_calendars = calendars;
                self.deps.sessions.save(&session).await?;
                info!(
                    calendars = session.discovered_calendars.len(),
                    "oauth session completed"
                );
                Ok(session)
            }
            Err(err) => {
                warn!(error = %err, "code exchange failed; discarding session");
                self.deps.sessions.remove(session_id).await?;
                Err(err.into())
            }
        }
    }

    /// Complete a session located by its `state` parameter.
    pub async fn complete_by_state(
        &self,
        code: &str,
        state: &str,
        redirect_uri: &str,
    ) -> Result<OAuthSession> {
        let Some(session) = self.deps.sessions.find_by_state(state).await? else {
            return Err(HearthSyncError::StateMismatch(
                "no authorization was issued with this state".into(),
            ));
        };
        self.complete_session(session.session_id, code, state, redirect_uri).await
    }

    /// Start a completed session from username/app-password credentials
    /// (iCloud, CalDAV). The result is materialized like an OAuth session.
    #[instrument(skip(self, username, secret), fields(%provider))]
    pub async fn start_credential_session(
        &self,
        family_id: Uuid,
        provider: CalendarProvider,
        username: &str,
        secret: &str,
    ) -> Result<OAuthSession> {
        if !provider.uses_basic_auth() {
            return Err(HearthSyncError::Validation(format!(
                "provider {provider} does not accept password credentials"
            )));
        }
        if username.trim().is_empty() || secret.is_empty() {
            return Err(HearthSyncError::Validation("username and password are required".into()));
        }
        let adapter = self.deps.providers.get(provider)?;

        let grant = self.bounded(adapter.authenticate_basic(username, secret)).await?;
        let calendars = self.bounded(adapter.list_calendars(&grant.tokens)).await?;

        let now = self.deps.clock.now();
        let session = OAuthSession {
            session_id: Uuid::new_v4(),
            family_id,
            provider,
            state: PkceChallenge::generate().state,
            code_verifier: String::new(),
            redirect_uri: String::new(),
            phase: SessionPhase::Completed,
            discovered_calendars: calendars,
            tokens: Some(grant.tokens),
            external_account_id: Some(grant.external_account_id),
            created_at: now,
            expires_at: now + self.session_ttl,
        };
        self.deps.sessions.insert(session.clone()).await?;
        Ok(session)
    }

    /// Turn the caller's calendar selections into connections.
    ///
    /// A live connection with the same key gets the new tokens reattached
    /// instead of a duplicate being created.
    #[instrument(skip(self, selections), fields(selections = selections.len()))]
    pub async fn materialize_connections(
        &self,
        session_id: Uuid,
        selections: &[CalendarSelection],
    ) -> Result<Vec<CalendarConnection>> {
        let session = self.live_session(session_id).await?;
        match session.phase {
            SessionPhase::Completed => {}
            SessionPhase::Initiated => {
                return Err(HearthSyncError::InvalidSession(
                    "session has not been completed".into(),
                ))
            }
            SessionPhase::Materialized => {
                return Err(HearthSyncError::InvalidSession(
                    "session was already used to create connections".into(),
                ))
            }
        }
        if selections.is_empty() {
            return Err(HearthSyncError::Validation("select at least one calendar".into()));
        }
        if let Some(unknown) =
            selections.iter().find(|s| session.find_calendar(&s.external_calendar_id).is_none())
        {
            return Err(HearthSyncError::Validation(format!(
                "calendar {} was not discovered for this account",
                unknown.external_calendar_id
            )));
        }
        for settings in selections.iter().filter_map(|s| s.sync_settings.as_ref()) {
            settings.validate()?;
        }

        let session = match self
            .deps
            .sessions
            .transition(session_id, SessionPhase::Completed, SessionPhase::Materialized)
            .await?
        {
            PhaseTransition::Applied(session) => session,
            PhaseTransition::Missing | PhaseTransition::Mismatch(_) => {
                return Err(HearthSyncError::InvalidSession(
                    "session was already used to create connections".into(),
                ))
            }
        };
        let (Some(tokens), Some(account_id)) =
            (session.tokens.clone(), session.external_account_id.clone())
        else {
            return Err(HearthSyncError::InvalidSession("session carries no tokens".into()));
        };

        let mut connections = Vec::with_capacity(selections.len());
        let mut failure = None;
        for selection in selections {
            match self.materialize_one(&session, selection, &account_id, &tokens).await {
                Ok(connection) => connections.push(connection),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        // Connections already stored sync now even if a later selection failed.
        for connection in &connections {
            if connection.status.is_syncable() {
                self.deps.trigger.request_sync(connection.clone());
            }
        }
        if let Some(err) = failure {
            warn!(created = connections.len(), error = %err, "materialization stopped early");
            return Err(err);
        }
        self.deps.sessions.remove(session_id).await?;

        info!(
            account = %redact_identifier(&account_id),
            created = connections.len(),
            "connections materialized"
        );
        Ok(connections)
    }

    async fn materialize_one(
        &self,
        session: &OAuthSession,
        selection: &CalendarSelection,
        account_id: &str,
        tokens: &TokenSet,
    ) -> Result<CalendarConnection> {
        let now = self.deps.clock.now();
        let discovered = session.find_calendar(&selection.external_calendar_id);
        let display_name = selection
            .display_name
            .clone()
            .or_else(|| discovered.map(|c| c.display_name.clone()))
            .unwrap_or_else(|| selection.external_calendar_id.clone());

        let mut candidate = CalendarConnection::new(
            session.family_id,
            session.provider,
            account_id,
            selection.external_calendar_id.clone(),
            display_name,
            now,
        );

        if let Some(mut existing) = self.deps.connections.find_live_by_key(&candidate.key()).await? {
            debug!(connection_id = %existing.id, "reattaching tokens to existing connection");
            self.deps.credentials.put(existing.id, tokens).await?;
            if let Some(settings) = &selection.sync_settings {
                existing.sync_settings = settings.clone();
            }
            if existing.status != ConnectionStatus::Paused {
                existing.status = ConnectionStatus::PendingAuth;
            }
            existing.consecutive_failures = 0;
            existing.last_sync_error = None;
            existing.next_sync_at = now;
            existing.updated_at = now;
            return self.deps.connections.update(&existing).await;
        }

        candidate.color = selection
            .color
            .clone()
            .or_else(|| discovered.and_then(|c| c.default_color.clone()));
        candidate.assigned_member_ids = selection.assigned_member_ids.clone();
        if let Some(settings) = &selection.sync_settings {
            candidate.sync_settings = settings.clone();
        }
        self.deps.connections.insert(&candidate).await?;
        self.deps.credentials.put(candidate.id, tokens).await?;
        Ok(candidate)
    }

    /// Drop sessions past their TTL.
    pub async fn purge_expired(&self) -> Result<usize> {
        self.deps.sessions.purge_expired(self.deps.clock.now()).await
    }

    async fn live_session(&self, session_id: Uuid) -> Result<OAuthSession> {
        let Some(session) = self.deps.sessions.get(session_id).await? else {
            return Err(HearthSyncError::InvalidSession("session not found".into()));
        };
        if session.is_expired(self.deps.clock.now()) {
            self.deps.sessions.remove(session_id).await?;
            return Err(HearthSyncError::InvalidSession("session expired".into()));
        }
        Ok(session)
    }

    async fn exchange_and_discover(
        &self,
        adapter: &dyn CalendarProviderAdapter,
        session: &OAuthSession,
        code: &str,
    ) -> std::result::Result<
        (TokenSet, String, Vec<hearthsync_domain::DiscoveredCalendar>),
        ProviderError,
    > {
        let grant = self
            .bounded(adapter.exchange_code(code, &session.code_verifier, &session.redirect_uri))
            .await?;
        let calendars = self.bounded(adapter.list_calendars(&grant.tokens)).await?;
        Ok((grant.tokens, grant.external_account_id, calendars))
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = std::result::Result<T, ProviderError>>,
    ) -> std::result::Result<T, ProviderError> {
        tokio::time::timeout(self.provider_timeout, call)
            .await
            .unwrap_or_else(|_| Err(ProviderError::transient("provider call timed out")))
    }
}

fn validate_redirect_uri(redirect_uri: &str) -> Result<()> {
    let url = Url::parse(redirect_uri)
        .map_err(|err| HearthSyncError::Validation(format!("invalid redirect URI: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(HearthSyncError::Validation(format!(
            "redirect URI scheme {other} is not supported"
        ))),
    }
}
