//! Out-of-band sync requests (initial sync after connecting)

use std::sync::Arc;

use hearthsync_domain::CalendarConnection;
use tracing::{error, Instrument};

use super::service::{ConnectionSyncService, SyncAttempt};

/// Requests a sync without waiting for it.
pub trait SyncTrigger: Send + Sync {
    fn request_sync(&self, connection: CalendarConnection);
}

/// Spawns the sync onto the current tokio runtime.
pub struct BackgroundSyncTrigger {
    sync: Arc<ConnectionSyncService>,
}

impl BackgroundSyncTrigger {
    pub fn new(sync: Arc<ConnectionSyncService>) -> Self {
        Self { sync }
    }
}

impl SyncTrigger for BackgroundSyncTrigger {
    fn request_sync(&self, connection: CalendarConnection) {
        let sync = Arc::clone(&self.sync);
        let span = tracing::info_span!("initial_sync", connection_id = %connection.id);
        tokio::spawn(
            async move {
                match sync.sync_connection(connection).await {
                    Ok(SyncAttempt::Completed(_) | SyncAttempt::Skipped(_)) => {}
                    Err(err) => error!(error = %err, "initial sync aborted by store failure"),
                }
            }
            .instrument(span),
        );
    }
}

/// Drops every request. For wiring where the scheduler alone drives syncs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSyncTrigger;

impl SyncTrigger for NoopSyncTrigger {
    fn request_sync(&self, _connection: CalendarConnection) {}
}
