//! # HearthSync Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - SQLite repositories for connections, mirrored events and credentials
//! - Provider adapters (Google, Outlook, iCloud/CalDAV, ICS feeds)
//! - The in-memory OAuth session store
//! - Family-scoped broadcast notifications
//! - The cron-driven sync scheduler and its metrics
//! - Configuration loading
//!
//! ## Architecture
//! - Implements traits defined in `hearthsync-core`
//! - Depends on `hearthsync-domain`, `hearthsync-common` and `hearthsync-core`
//! - Contains all "impure" code (I/O, network, clocks of the outside world)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod notifications;
pub mod oauth;
pub mod observability;
pub mod providers;
pub mod scheduling;

// Re-export commonly used items
pub use database::{
    DbManager, SqliteConnectionRepository, SqliteCredentialStore, SqliteMirroredEventRepository,
};
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder};
pub use notifications::BroadcastTransport;
pub use oauth::InMemorySessionStore;
pub use observability::{SyncMetrics, SyncMetricsSnapshot};
pub use providers::{build_registry, HttpFeedFetcher};
pub use scheduling::{SchedulerError, SyncScheduler, SyncSchedulerConfig};
