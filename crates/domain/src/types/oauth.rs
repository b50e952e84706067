//! OAuth session state and provider tokens

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::connection::{CalendarProvider, SyncSettings};
use crate::impl_domain_status_conversions;

/// Provider tokens attached to a connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenSet {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expires_at: None,
            scope: None,
        }
    }

    /// True if the token is expired or will expire within `threshold`.
    /// Tokens without an expiry never need refreshing.
    pub fn expires_within(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.expires_at.is_some_and(|at| at <= now + threshold)
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Result of exchanging an authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGrant {
    pub tokens: TokenSet,
    pub external_account_id: String,
}

/// A remote calendar visible to the authorised account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredCalendar {
    pub external_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_color: Option<String>,
}

/// Caller's choice of one discovered calendar to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSelection {
    pub external_calendar_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub assigned_member_ids: Vec<Uuid>,
    /// Defaults apply when omitted.
    #[serde(default)]
    pub sync_settings: Option<SyncSettings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Initiated,
    Completed,
    Materialized,
}

impl_domain_status_conversions!(SessionPhase {
    Initiated => "initiated",
    Completed => "completed",
    Materialized => "materialized",
});

/// In-progress provider authorization. Lives only until its TTL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthSession {
    pub session_id: Uuid,
    pub family_id: Uuid,
    pub provider: CalendarProvider,
    pub state: String,
    #[serde(skip_serializing, default)]
    pub code_verifier: String,
    pub redirect_uri: String,
    pub phase: SessionPhase,
    #[serde(default)]
    pub discovered_calendars: Vec<DiscoveredCalendar>,
    #[serde(skip)]
    pub tokens: Option<TokenSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OAuthSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn find_calendar(&self, external_id: &str) -> Option<&DiscoveredCalendar> {
        self.discovered_calendars.iter().find(|c| c.external_id == external_id)
    }
}
