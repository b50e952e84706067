//! Calendar connection aggregate and its state machine

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    DEFAULT_SYNC_FUTURE_DAYS, DEFAULT_SYNC_INTERVAL_MINUTES, DEFAULT_SYNC_PAST_DAYS,
    MAX_SYNC_INTERVAL_MINUTES, MAX_SYNC_WINDOW_DAYS,
};
use crate::errors::{HearthSyncError, Result};
use crate::impl_domain_status_conversions;

/// External calendar source backing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarProvider {
    Google,
    Outlook,
    #[serde(rename = "icloud")]
    ICloud,
    #[serde(rename = "caldav")]
    CalDav,
    IcsUrl,
    Internal,
}

impl_domain_status_conversions!(CalendarProvider {
    Google => "google",
    Outlook => "outlook",
    ICloud => "icloud",
    CalDav => "caldav",
    IcsUrl => "ics_url",
    Internal => "internal",
});

impl CalendarProvider {
    /// Providers authorised through the OAuth session flow.
    pub fn uses_oauth(self) -> bool {
        matches!(self, Self::Google | Self::Outlook)
    }

    /// Providers whose adapters need stored credentials to fetch.
    pub fn requires_credentials(self) -> bool {
        !matches!(self, Self::IcsUrl | Self::Internal)
    }

    /// Providers connected with a username and app password.
    pub fn uses_basic_auth(self) -> bool {
        matches!(self, Self::ICloud | Self::CalDav)
    }

    /// Providers that never accept pushed events.
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::IcsUrl | Self::Internal)
    }
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    PendingAuth,
    Active,
    Paused,
    AuthError,
    SyncError,
    Disconnected,
}

impl_domain_status_conversions!(ConnectionStatus {
    PendingAuth => "pending_auth",
    Active => "active",
    Paused => "paused",
    AuthError => "auth_error",
    SyncError => "sync_error",
    Disconnected => "disconnected",
});

impl ConnectionStatus {
    /// Statuses the periodic scheduler will pick up once due.
    ///
    /// PendingAuth is included so that a connection whose first sync was
    /// lost (crash, shutdown, dropped trigger) is retried after its lease.
    pub const SCHEDULABLE: [Self; 3] = [Self::PendingAuth, Self::Active, Self::SyncError];

    pub fn is_schedulable(self) -> bool {
        Self::SCHEDULABLE.contains(&self)
    }

    /// Statuses a sync attempt (scheduled or manual) may run from.
    pub fn is_syncable(self) -> bool {
        matches!(self, Self::PendingAuth | Self::Active | Self::SyncError)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Self-transitions are allowed so that repeated outcomes (another
    /// transient failure, another success) can be recorded.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionStatus::{Active, AuthError, Disconnected, Paused, PendingAuth, SyncError};

        if self == Disconnected {
            return false;
        }
        if self == next || next == Disconnected {
            return true;
        }
        match (self, next) {
            (PendingAuth, Active | AuthError | SyncError) => true,
            (Active, SyncError | AuthError | Paused) => true,
            (SyncError, Active | AuthError | Paused) => true,
            (AuthError, Paused | PendingAuth) => true,
            (Paused, Active) => true,
            // Re-authentication reattaches tokens and restarts at PendingAuth.
            (Active | SyncError, PendingAuth) => true,
            _ => false,
        }
    }
}

/// Opaque optimistic-concurrency token. Every persisted write bumps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub i64);

impl Version {
    pub const INITIAL: Self = Self(1);

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Per-connection sync preferences. Omitted fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    pub sync_interval_minutes: u32,
    pub sync_past_days: u32,
    pub sync_future_days: u32,
    pub import_all_day_events: bool,
    pub import_declined_events: bool,
    pub two_way_sync: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_interval_minutes: DEFAULT_SYNC_INTERVAL_MINUTES,
            sync_past_days: DEFAULT_SYNC_PAST_DAYS,
            sync_future_days: DEFAULT_SYNC_FUTURE_DAYS,
            import_all_day_events: true,
            import_declined_events: false,
            two_way_sync: false,
        }
    }
}

impl SyncSettings {
    pub fn interval(&self) -> Duration {
        Duration::minutes(i64::from(self.sync_interval_minutes.max(1)))
    }

    /// `[now - past_days, now + future_days]`, each side capped at
    /// [`MAX_SYNC_WINDOW_DAYS`].
    pub fn window(&self, now: DateTime<Utc>) -> SyncWindow {
        let past = self.sync_past_days.min(MAX_SYNC_WINDOW_DAYS);
        let future = self.sync_future_days.min(MAX_SYNC_WINDOW_DAYS);
        SyncWindow {
            start: now - Duration::days(i64::from(past)),
            end: now + Duration::days(i64::from(future)),
        }
    }

    /// Reject caller-supplied settings outside the supported bounds.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_SYNC_INTERVAL_MINUTES).contains(&self.sync_interval_minutes) {
            return Err(HearthSyncError::Validation(format!(
                "syncIntervalMinutes must be between 1 and {MAX_SYNC_INTERVAL_MINUTES}"
            )));
        }
        for (field, days) in
            [("syncPastDays", self.sync_past_days), ("syncFutureDays", self.sync_future_days)]
        {
            if days > MAX_SYNC_WINDOW_DAYS {
                return Err(HearthSyncError::Validation(format!(
                    "{field} must be at most {MAX_SYNC_WINDOW_DAYS}"
                )));
            }
        }
        Ok(())
    }
}

/// Time range fetched and mirrored per sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// True when `[start, end]` overlaps the window.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start <= self.end && end.max(start) >= self.start
    }
}

/// Uniqueness key: at most one live connection exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub family_id: Uuid,
    pub provider: CalendarProvider,
    pub external_account_id: String,
    pub external_calendar_id: String,
}

/// A family's link to one external calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarConnection {
    pub id: Uuid,
    pub family_id: Uuid,
    pub provider: CalendarProvider,
    pub external_account_id: String,
    pub external_calendar_id: String,
    pub display_name: String,
    pub status: ConnectionStatus,
    pub assigned_member_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub is_enabled: bool,
    pub is_read_only: bool,
    pub sync_settings: SyncSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    pub next_sync_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_error: Option<String>,
    pub consecutive_failures: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: Version,
}

impl CalendarConnection {
    /// New connection awaiting its first successful sync, due immediately.
    pub fn new(
        family_id: Uuid,
        provider: CalendarProvider,
        external_account_id: impl Into<String>,
        external_calendar_id: impl Into<String>,
        display_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            family_id,
            provider,
            external_account_id: external_account_id.into(),
            external_calendar_id: external_calendar_id.into(),
            display_name: display_name.into(),
            status: ConnectionStatus::PendingAuth,
            assigned_member_ids: Vec::new(),
            color: None,
            is_enabled: true,
            is_read_only: provider.is_read_only(),
            sync_settings: SyncSettings::default(),
            last_synced_at: None,
            next_sync_at: now,
            last_sync_error: None,
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
            version: Version::INITIAL,
        }
    }

    pub fn key(&self) -> ConnectionKey {
        ConnectionKey {
            family_id: self.family_id,
            provider: self.provider,
            external_account_id: self.external_account_id.clone(),
            external_calendar_id: self.external_calendar_id.clone(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_enabled && self.status.is_schedulable() && self.next_sync_at <= now
    }

    /// Two-way push only ever applies to writable connections.
    pub fn pushes_local_events(&self) -> bool {
        self.sync_settings.two_way_sync && !self.is_read_only
    }
}
