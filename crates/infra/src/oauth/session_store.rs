//! In-process OAuth session store
//!
//! Sessions live for minutes and never outlive the process that issued the
//! authorization URL, so they are kept in a sharded map rather than SQLite.
//! Phase transitions hold the shard lock for the compare and the write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hearthsync_core::{OAuthSessionStore, PhaseTransition};
use hearthsync_domain::{HearthSyncError, OAuthSession, Result, SessionPhase};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<Uuid, OAuthSession>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl OAuthSessionStore for InMemorySessionStore {
    async fn insert(&self, session: OAuthSession) -> Result<()> {
        match self.sessions.entry(session.session_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(HearthSyncError::ConcurrencyConflict(
                format!("OAuth session {} already exists", session.session_id),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<OAuthSession>> {
        Ok(self.sessions.get(&session_id).map(|entry| entry.value().clone()))
    }

    async fn find_by_state(&self, state: &str) -> Result<Option<OAuthSession>> {
        Ok(self
            .sessions
            .iter()
            .find(|entry| entry.value().state == state)
            .map(|entry| entry.value().clone()))
    }

    async fn transition(
        &self,
        session_id: Uuid,
        expected: SessionPhase,
        next: SessionPhase,
    ) -> Result<PhaseTransition> {
        let Some(mut entry) = self.sessions.get_mut(&session_id) else {
            return Ok(PhaseTransition::Missing);
        };
        let session = entry.value_mut();
        if session.phase != expected {
            return Ok(PhaseTransition::Mismatch(session.phase));
        }
        session.phase = next;
        debug!(%session_id, from = ?expected, to = ?next, "OAuth session phase changed");
        Ok(PhaseTransition::Applied(session.clone()))
    }

    async fn save(&self, session: &OAuthSession) -> Result<()> {
        match self.sessions.get_mut(&session.session_id) {
            Some(mut entry) => {
                *entry.value_mut() = session.clone();
                Ok(())
            }
            None => Err(HearthSyncError::InvalidSession(format!(
                "OAuth session {} expired or was removed",
                session.session_id
            ))),
        }
    }

    async fn remove(&self, session_id: Uuid) -> Result<()> {
        self.sessions.remove(&session_id);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(now));
        Ok(before.saturating_sub(self.sessions.len()))
    }
}
