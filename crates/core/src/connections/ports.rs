//! Persistence ports for connections, mirrored events and credentials

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearthsync_domain::{
    CalendarConnection, ConnectionKey, MirroredEvent, Result, TokenSet, Version,
};
use uuid::Uuid;

use crate::sync::reconcile::EventChangeSet;

/// Storage for [`CalendarConnection`] aggregates.
///
/// Every write is a compare-and-swap on [`CalendarConnection::version`].
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<CalendarConnection>>;

    /// Insert a new connection.
    ///
    /// Fails with `ConcurrencyConflict` when a non-disconnected connection
    /// already exists for the same [`ConnectionKey`].
    async fn insert(&self, connection: &CalendarConnection) -> Result<()>;

    /// Persist `connection` if the stored version still equals
    /// `connection.version`, returning the stored copy with the bumped version.
    ///
    /// A stale version yields `ConcurrencyConflict`; a missing row `NotFound`.
    async fn update(&self, connection: &CalendarConnection) -> Result<CalendarConnection>;

    /// Enabled, schedulable connections with `next_sync_at <= now`, oldest
    /// first, at most `limit`.
    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<CalendarConnection>>;

    async fn find_live_by_key(&self, key: &ConnectionKey) -> Result<Option<CalendarConnection>>;

    async fn list_for_family(&self, family_id: Uuid) -> Result<Vec<CalendarConnection>>;
}

/// The claim a sync worker holds on a connection while it writes mirrors.
///
/// A mirror write carrying a fence only lands while the stored connection is
/// still at `version` and not disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimFence {
    pub connection_id: Uuid,
    pub version: Version,
}

impl ClaimFence {
    pub fn of(connection: &CalendarConnection) -> Self {
        Self { connection_id: connection.id, version: connection.version }
    }
}

/// Storage for events mirrored from a connection.
#[async_trait]
pub trait MirroredEventRepository: Send + Sync {
    async fn list_for_connection(&self, connection_id: Uuid) -> Result<Vec<MirroredEvent>>;

    /// Apply a reconciliation result atomically, checking `fence` in the same
    /// transaction. A lost claim yields `ConcurrencyConflict` and writes nothing.
    async fn apply_changes(&self, fence: ClaimFence, changes: &EventChangeSet) -> Result<()>;

    /// Record the provider id assigned to a pushed local event and clear its
    /// local flags. Fenced like [`apply_changes`](Self::apply_changes).
    async fn assign_external_id(
        &self,
        fence: ClaimFence,
        event_id: Uuid,
        external_id: &str,
    ) -> Result<()>;

    /// Remove every mirrored event of a connection, returning how many went.
    async fn delete_for_connection(&self, connection_id: Uuid) -> Result<u64>;
}

/// Provider credentials keyed by connection id.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, connection_id: Uuid) -> Result<Option<TokenSet>>;

    /// Insert or overwrite.
    async fn put(&self, connection_id: Uuid, tokens: &TokenSet) -> Result<()>;

    async fn delete(&self, connection_id: Uuid) -> Result<()>;
}
