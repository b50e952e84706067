//! Mirrored and remote calendar events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event as returned by a provider adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    pub external_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_declined: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Local copy of a provider event, owned by one connection.
///
/// `external_id` is `None` only for events created locally that have not
/// been pushed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirroredEvent {
    pub id: Uuid,
    pub connection_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub assignee_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub content_hash: String,
    #[serde(default)]
    pub deleted_locally: bool,
    #[serde(default)]
    pub locally_modified: bool,
    pub updated_at: DateTime<Utc>,
}

/// Event fields that participate in change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventContent<'a> {
    pub title: &'a str,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
    pub location: Option<&'a str>,
}

impl RemoteEvent {
    pub fn content(&self) -> EventContent<'_> {
        EventContent {
            title: &self.title,
            start_time: self.start_time,
            end_time: self.end_time,
            is_all_day: self.is_all_day,
            location: self.location.as_deref(),
        }
    }
}

impl MirroredEvent {
    pub fn content(&self) -> EventContent<'_> {
        EventContent {
            title: &self.title,
            start_time: self.start_time,
            end_time: self.end_time,
            is_all_day: self.is_all_day,
            location: self.location.as_deref(),
        }
    }

    /// Render as the provider-facing shape used when pushing.
    pub fn to_remote(&self, external_id: impl Into<String>) -> RemoteEvent {
        RemoteEvent {
            external_id: external_id.into(),
            title: self.title.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            is_all_day: self.is_all_day,
            location: self.location.clone(),
            description: None,
            is_declined: false,
            color: self.color.clone(),
        }
    }
}
