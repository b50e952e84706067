//! Sync results and notifications

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::SyncErrorKind;

/// Result of one connection sync attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub connection_id: Uuid,
    pub success: bool,
    pub events_added: u32,
    pub events_updated: u32,
    pub events_deleted: u32,
    /// Local events pushed to the provider (two-way sync only).
    pub events_pushed: u32,
    pub push_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<SyncErrorKind>,
    /// Provider retry hint carried from a rate-limited failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl SyncOutcome {
    pub fn succeeded(connection_id: Uuid) -> Self {
        Self { connection_id, success: true, ..Self::default() }
    }

    pub fn failed(connection_id: Uuid, kind: SyncErrorKind, message: impl Into<String>) -> Self {
        Self {
            connection_id,
            success: false,
            error_message: Some(message.into()),
            error_kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn total_changes(&self) -> u32 {
        self.events_added + self.events_updated + self.events_deleted
    }

    /// Whether the mirrored set changed and subscribers should hear about it.
    pub fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }
}

/// Family-scoped "calendar changed" signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    pub family_id: Uuid,
    pub connection_id: Uuid,
    pub events_added: u32,
    pub events_updated: u32,
    pub events_deleted: u32,
}

impl ChangeNotification {
    pub fn from_outcome(family_id: Uuid, outcome: &SyncOutcome) -> Self {
        Self {
            family_id,
            connection_id: outcome.connection_id,
            events_added: outcome.events_added,
            events_updated: outcome.events_updated,
            events_deleted: outcome.events_deleted,
        }
    }
}

/// Result of probing an ICS feed URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IcsValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IcsValidationResult {
    pub fn valid(calendar_name: Option<String>) -> Self {
        Self { valid: true, calendar_name, error: None }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self { valid: false, calendar_name: None, error: Some(error.into()) }
    }
}
