//! Domain constants
//!
//! Defaults used when configuration omits a value. Policy knobs (backoff,
//! batch size, timeouts) are all overridable through [`crate::config::Config`].

// Connection defaults
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u32 = 15;
pub const DEFAULT_SYNC_PAST_DAYS: u32 = 30;
pub const DEFAULT_SYNC_FUTURE_DAYS: u32 = 90;
pub const MAX_SYNC_INTERVAL_MINUTES: u32 = 24 * 60;
pub const MAX_SYNC_WINDOW_DAYS: u32 = 3 * 365;

// Scheduler
pub const DEFAULT_SCHEDULER_CRON: &str = "0 */5 * * * *";
pub const DEFAULT_BATCH_LIMIT: usize = 50;
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
pub const DEFAULT_CLAIM_LEASE_SECS: u64 = 15 * 60;
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

// Backoff
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 5 * 60;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 6 * 60 * 60;

// OAuth
pub const DEFAULT_OAUTH_SESSION_TTL_SECS: u64 = 10 * 60;
pub const TOKEN_REFRESH_THRESHOLD_SECS: i64 = 5 * 60;

// Notifications
pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 2_000;
pub const CHANGE_EVENT_NAME: &str = "calendar-changed";

// ICS
pub const ICS_VALIDATION_TIMEOUT_SECS: u64 = 10;
pub const ICS_CALENDAR_PREFIX: &str = "BEGIN:VCALENDAR";
pub const MAX_ICS_BYTES: usize = 5 * 1024 * 1024;
