//! Configuration management

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BACKOFF_BASE_SECS, DEFAULT_BATCH_LIMIT, DEFAULT_CLAIM_LEASE_SECS,
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_MAX_BACKOFF_SECS, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_OAUTH_SESSION_TTL_SECS, DEFAULT_PROVIDER_TIMEOUT_SECS, DEFAULT_PUBLISH_TIMEOUT_MS,
    DEFAULT_SCHEDULER_CRON,
};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerSettings,
    pub backoff: BackoffConfig,
    pub oauth: OAuthConfig,
    pub caldav: CalDavConfig,
    pub notifier: NotifierConfig,
    pub server: ServerConfig,
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "hearthsync.db".to_string(), pool_size: 8 }
    }
}

/// Periodic sync scheduling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub enabled: bool,
    /// Six-field cron expression (seconds first).
    pub cron_expression: String,
    pub batch_limit: usize,
    pub max_concurrency: usize,
    /// How long a claimed connection stays reserved if its worker dies.
    pub claim_lease_secs: u64,
    /// Upper bound for every provider call.
    pub provider_timeout_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cron_expression: DEFAULT_SCHEDULER_CRON.to_string(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            claim_lease_secs: DEFAULT_CLAIM_LEASE_SECS,
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
        }
    }
}

/// Failure backoff policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_interval_secs: u64,
    /// Consecutive transient failures before a connection enters `SyncError`.
    pub failure_threshold: u32,
    pub max_backoff_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_interval_secs: DEFAULT_BACKOFF_BASE_SECS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            max_backoff_secs: DEFAULT_MAX_BACKOFF_SECS,
        }
    }
}

/// OAuth client registration for one provider
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,
    /// Override for tests and sovereign clouds.
    #[serde(default)]
    pub auth_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub api_base_url: Option<String>,
}

impl std::fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("auth_endpoint", &self.auth_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub session_ttl_secs: u64,
    pub google: Option<OAuthClientConfig>,
    pub outlook: Option<OAuthClientConfig>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self { session_ttl_secs: DEFAULT_OAUTH_SESSION_TTL_SECS, google: None, outlook: None }
    }
}

/// CalDAV endpoints for credential-based providers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalDavConfig {
    pub icloud_endpoint: String,
    /// Server for the generic CalDAV provider, if one is offered.
    pub server_url: Option<String>,
}

impl Default for CalDavConfig {
    fn default() -> Self {
        Self { icloud_endpoint: "https://caldav.icloud.com".to_string(), server_url: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub publish_timeout_ms: u64,
    pub channel_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self { publish_timeout_ms: DEFAULT_PUBLISH_TIMEOUT_MS, channel_capacity: 256 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: "127.0.0.1:8080".to_string() }
    }
}
