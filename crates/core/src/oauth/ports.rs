//! Port for the ephemeral OAuth session store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearthsync_domain::{OAuthSession, Result, SessionPhase};
use uuid::Uuid;

/// Result of an atomic phase change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseTransition {
    /// Phase moved; carries the session as stored after the change.
    Applied(OAuthSession),
    Missing,
    /// The session was in a different phase.
    Mismatch(SessionPhase),
}

/// TTL-bound storage for in-progress authorizations.
#[async_trait]
pub trait OAuthSessionStore: Send + Sync {
    async fn insert(&self, session: OAuthSession) -> Result<()>;

    async fn get(&self, session_id: Uuid) -> Result<Option<OAuthSession>>;

    async fn find_by_state(&self, state: &str) -> Result<Option<OAuthSession>>;

    /// Move the session from `expected` to `next` only if it is currently in
    /// `expected`. Concurrent callers see exactly one `Applied`.
    async fn transition(
        &self,
        session_id: Uuid,
        expected: SessionPhase,
        next: SessionPhase,
    ) -> Result<PhaseTransition>;

    /// Overwrite an existing session (tokens, discovered calendars).
    async fn save(&self, session: &OAuthSession) -> Result<()>;

    async fn remove(&self, session_id: Uuid) -> Result<()>;

    /// Drop sessions whose TTL elapsed, returning how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}
