//! Error types used throughout the engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed provider interaction.
///
/// Drives the connection state machine: `Auth` halts scheduling, everything
/// else is retried with backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    Auth,
    Transient,
    RateLimited,
    Unknown,
}

crate::impl_domain_status_conversions!(SyncErrorKind {
    Auth => "auth",
    Transient => "transient",
    RateLimited => "rate_limited",
    Unknown => "unknown",
});

impl SyncErrorKind {
    /// Whether a failure of this kind should be retried on a later run.
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Auth)
    }
}

/// Error returned by a provider adapter or feed fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} provider error: {message}")]
pub struct ProviderError {
    pub kind: SyncErrorKind,
    pub message: String,
    /// Provider supplied retry hint (seconds), only meaningful for `RateLimited`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ProviderError {
    pub fn new(kind: SyncErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), retry_after_secs: None }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::Auth, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::Transient, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::Unknown, message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: Option<u64>) -> Self {
        Self { kind: SyncErrorKind::RateLimited, message: message.into(), retry_after_secs }
    }
}

/// Main error type for HearthSync
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum HearthSyncError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("State mismatch: {0}")]
    StateMismatch(String),

    #[error("Redirect URI mismatch: {0}")]
    RedirectUriMismatch(String),

    #[error("Session already consumed: {0}")]
    SessionAlreadyConsumed(String),

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Provider error: {0}")]
    Provider(ProviderError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HearthSyncError {
    /// Stable machine-readable label, used in logs and HTTP bodies.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Config(_) => "config",
            Self::Network(_) => "network",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::InvalidSession(_) => "invalid_session",
            Self::StateMismatch(_) => "state_mismatch",
            Self::RedirectUriMismatch(_) => "redirect_uri_mismatch",
            Self::SessionAlreadyConsumed(_) => "session_already_consumed",
            Self::ConcurrencyConflict(_) => "concurrency_conflict",
            Self::Provider(_) => "provider",
            Self::Internal(_) => "internal",
        }
    }

    /// Entity store failures abort a batch; everything else is per-connection.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<ProviderError> for HearthSyncError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err)
    }
}

/// Result type alias for HearthSync operations
pub type Result<T> = std::result::Result<T, HearthSyncError>;
