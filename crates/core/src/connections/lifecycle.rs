//! User-driven connection lifecycle: pause, resume, disconnect, sync now,
//! and ICS subscriptions

use std::sync::Arc;

use hearthsync_common::{redact_identifier, SharedClock};
use hearthsync_domain::{
    CalendarConnection, CalendarProvider, ConnectionStatus, HearthSyncError, Result, SyncSettings,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::ports::{ConnectionRepository, CredentialStore, MirroredEventRepository};
use crate::ics::{normalize_feed_url, IcsValidator};
use crate::sync::{ConnectionSyncService, SyncAttempt, SyncTrigger};

/// Input for subscribing to an ICS feed.
#[derive(Debug, Clone, Default)]
pub struct IcsSubscription {
    pub family_id: Uuid,
    pub url: String,
    pub display_name: Option<String>,
    pub color: Option<String>,
    pub assigned_member_ids: Vec<Uuid>,
    /// Defaults apply when omitted. Feeds are read-only, so two-way sync is
    /// always switched off.
    pub sync_settings: Option<SyncSettings>,
}

pub struct LifecycleDependencies {
    pub connections: Arc<dyn ConnectionRepository>,
    pub events: Arc<dyn MirroredEventRepository>,
    pub credentials: Arc<dyn CredentialStore>,
    pub sync: Arc<ConnectionSyncService>,
    pub trigger: Arc<dyn SyncTrigger>,
    pub ics: Arc<IcsValidator>,
    pub clock: SharedClock,
}

pub struct ConnectionLifecycleService {
    deps: LifecycleDependencies,
}

impl ConnectionLifecycleService {
    pub fn new(deps: LifecycleDependencies) -> Self {
        Self { deps }
    }

    pub async fn get(&self, connection_id: Uuid) -> Result<CalendarConnection> {
        self.deps
            .connections
            .get(connection_id)
            .await?
            .ok_or_else(|| HearthSyncError::NotFound(format!("connection {connection_id}")))
    }

    pub async fn list_for_family(&self, family_id: Uuid) -> Result<Vec<CalendarConnection>> {
        self.deps.connections.list_for_family(family_id).await
    }

    #[instrument(skip(self))]
    pub async fn pause(&self, connection_id: Uuid) -> Result<CalendarConnection> {
        let connection = self.get(connection_id).await?;
        self.transition(connection, ConnectionStatus::Paused).await
    }

    /// Resume a paused connection; it becomes due immediately.
    #[instrument(skip(self))]
    pub async fn resume(&self, connection_id: Uuid) -> Result<CalendarConnection> {
        let mut connection = self.get(connection_id).await?;
        if connection.status != ConnectionStatus::Paused {
            return Err(HearthSyncError::Validation(format!(
                "only paused connections can be resumed (status is {})",
                connection.status
            )));
        }
        connection.consecutive_failures = 0;
        connection.last_sync_error = None;
        connection.next_sync_at = self.deps.clock.now();
        self.transition(connection, ConnectionStatus::Active).await
    }

    /// Terminal: mirrored events and credentials are removed.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, connection_id: Uuid) -> Result<CalendarConnection> {
        let mut connection = self.get(connection_id).await?;
        if connection.status == ConnectionStatus::Disconnected {
            return Ok(connection);
        }
        connection.is_enabled = false;
        let stored = self.transition(connection, ConnectionStatus::Disconnected).await?;

        let removed = self.deps.events.delete_for_connection(connection_id).await?;
        self.deps.credentials.delete(connection_id).await?;
        info!(removed_events = removed, "connection disconnected");
        Ok(stored)
    }

    /// Run a sync right away through the normal claim path.
    #[instrument(skip(self))]
    pub async fn request_sync(&self, connection_id: Uuid) -> Result<SyncAttempt> {
        let connection = self.get(connection_id).await?;
        if !connection.status.is_syncable() {
            return Err(HearthSyncError::Validation(format!(
                "connection in status {} cannot be synced",
                connection.status
            )));
        }
        self.deps.sync.sync_connection(connection).await
    }

    /// Validate a feed and create a read-only connection for it.
    #[instrument(
        skip(self, subscription),
        fields(family = %redact_identifier(&subscription.family_id.to_string()))
    )]
    pub async fn create_ics_connection(
        &self,
        subscription: IcsSubscription,
    ) -> Result<CalendarConnection> {
        let url = normalize_feed_url(&subscription.url).map_err(HearthSyncError::Validation)?;
        if let Some(settings) = &subscription.sync_settings {
            settings.validate()?;
        }
        let validation = self.deps.ics.validate(url.as_str()).await;
        if !validation.valid {
            return Err(HearthSyncError::Validation(
                validation.error.unwrap_or_else(|| "feed is not a valid calendar".into()),
            ));
        }

        let display_name = subscription
            .display_name
            .filter(|name| !name.trim().is_empty())
            .or(validation.calendar_name)
            .unwrap_or_else(|| url.host_str().unwrap_or("Calendar").to_string());

        let mut connection = CalendarConnection::new(
            subscription.family_id,
            CalendarProvider::IcsUrl,
            url.as_str(),
            url.as_str(),
            display_name,
            self.deps.clock.now(),
        );
        if self.deps.connections.find_live_by_key(&connection.key()).await?.is_some() {
            return Err(HearthSyncError::Validation(
                "this feed is already connected for the family".into(),
            ));
        }
        connection.is_read_only = true;
        if let Some(settings) = subscription.sync_settings {
            connection.sync_settings = settings;
        }
        connection.sync_settings.two_way_sync = false;
        connection.color = subscription.color;
        connection.assigned_member_ids = subscription.assigned_member_ids;

        self.deps.connections.insert(&connection).await?;
        self.deps.trigger.request_sync(connection.clone());
        info!(connection_id = %connection.id, "ics connection created");
        Ok(connection)
    }

    async fn transition(
        &self,
        mut connection: CalendarConnection,
        next: ConnectionStatus,
    ) -> Result<CalendarConnection> {
        if !connection.status.can_transition_to(next) {
            return Err(HearthSyncError::Validation(format!(
                "cannot move connection from {} to {next}",
                connection.status
            )));
        }
        connection.status = next;
        connection.updated_at = self.deps.clock.now();
        self.deps.connections.update(&connection).await
    }
}
