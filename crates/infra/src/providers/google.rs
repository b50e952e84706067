//! Google Calendar provider implementation

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use hearthsync_core::{AuthorizationRequest, CalendarProviderAdapter, ProviderResult};
use hearthsync_domain::{
    AuthorizationGrant, CalendarProvider, DiscoveredCalendar, MirroredEvent, OAuthClientConfig,
    ProviderError, RemoteEvent, SyncWindow, TokenSet,
};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::api_url;
use super::oauth_client::OAuthTokenClient;
use crate::http::HttpClient;

pub const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

const GOOGLE_SCOPES: [&str; 3] =
    ["https://www.googleapis.com/auth/calendar", "openid", "email"];
const PAGE_SIZE: &str = "250";

/// Google Calendar adapter
#[derive(Debug, Clone)]
pub struct GoogleCalendarAdapter {
    oauth: OAuthTokenClient,
    api_base: String,
}

impl GoogleCalendarAdapter {
    pub fn new(http: HttpClient, config: &OAuthClientConfig) -> Self {
        let oauth = OAuthTokenClient::from_config(
            http,
            config,
            GOOGLE_AUTH_ENDPOINT,
            GOOGLE_TOKEN_ENDPOINT,
        )
        .with_scopes(GOOGLE_SCOPES)
        .with_authorize_param("access_type", "offline")
        .with_authorize_param("prompt", "consent");

        Self {
            oauth,
            api_base: config
                .api_base_url
                .clone()
                .unwrap_or_else(|| GOOGLE_CALENDAR_API_BASE.to_string()),
        }
    }

    fn http(&self) -> &HttpClient {
        self.oauth.http()
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        tokens: &TokenSet,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> ProviderResult<T> {
        let url = api_url(&self.api_base, segments)?;
        let builder =
            self.http().request(Method::GET, url).bearer_auth(&tokens.access_token).query(query);
        self.http().send_json(builder).await
    }
}

#[async_trait]
impl CalendarProviderAdapter for GoogleCalendarAdapter {
    fn provider(&self) -> CalendarProvider {
        CalendarProvider::Google
    }

    fn authorization_url(&self, request: &AuthorizationRequest<'_>) -> ProviderResult<String> {
        self.oauth.authorization_url(request)
    }

    #[instrument(skip_all, fields(provider = "google"))]
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> ProviderResult<AuthorizationGrant> {
        let tokens = self.oauth.exchange_code(code, code_verifier, redirect_uri).await?;
        let primary: GoogleCalendarListEntry =
            self.get_json(&tokens, &["users", "me", "calendarList", "primary"], &[]).await?;
        Ok(AuthorizationGrant { tokens, external_account_id: primary.id })
    }

    #[instrument(skip_all, fields(provider = "google"))]
    async fn list_calendars(&self, tokens: &TokenSet) -> ProviderResult<Vec<DiscoveredCalendar>> {
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = Vec::new();
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }
            let page: GoogleCalendarListResponse =
                self.get_json(tokens, &["users", "me", "calendarList"], &query).await?;

            calendars.extend(page.items.into_iter().map(|entry| DiscoveredCalendar {
                display_name: entry
                    .summary_override
                    .or(entry.summary)
                    .unwrap_or_else(|| entry.id.clone()),
                external_id: entry.id,
                default_color: entry.background_color,
            }));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(calendars)
    }

    #[instrument(skip(self, tokens), fields(provider = "google"))]
    async fn fetch_events(
        &self,
        tokens: Option<&TokenSet>,
        calendar_id: &str,
        window: SyncWindow,
    ) -> ProviderResult<Vec<RemoteEvent>> {
        let tokens = tokens.ok_or_else(|| ProviderError::auth("missing Google credentials"))?;
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("timeMin", window.start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("timeMax", window.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("maxResults", PAGE_SIZE.to_string()),
            ];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let page: GoogleEventsResponse =
                self.get_json(tokens, &["calendars", calendar_id, "events"], &query).await?;

            events.extend(page.items.into_iter().filter_map(to_remote_event));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = events.len(), "fetched Google events");
        Ok(events)
    }

    #[instrument(skip(self, tokens, event), fields(provider = "google", event_id = %event.id))]
    async fn push_event(
        &self,
        tokens: &TokenSet,
        calendar_id: &str,
        event: &MirroredEvent,
    ) -> ProviderResult<String> {
        let url = api_url(&self.api_base, &["calendars", calendar_id, "events"])?;
        let body = GoogleEventInsert {
            summary: &event.title,
            location: event.location.as_deref(),
            start: event_time(event.start_time, event.is_all_day),
            end: event_time(event.end_time, event.is_all_day),
        };
        let builder = self
            .http()
            .request(Method::POST, url)
            .bearer_auth(&tokens.access_token)
            .json(&body);
        let created: GoogleCreatedEvent = self.http().send_json(builder).await?;
        Ok(created.id)
    }

    async fn refresh_token(&self, tokens: &TokenSet) -> ProviderResult<TokenSet> {
        self.oauth.refresh(tokens).await
    }
}

fn to_remote_event(event: GoogleCalendarEvent) -> Option<RemoteEvent> {
    if event.status.as_deref() == Some("cancelled") {
        return None;
    }

    let is_all_day = event.start.date.is_some();
    let (Some(start_time), Some(end_time)) = (parse_time(&event.start), parse_time(&event.end))
    else {
        warn!(event_id = %event.id, "skipping event with unparseable times");
        return None;
    };

    let is_declined = event.attendees.iter().flatten().any(|attendee| {
        attendee.is_self && attendee.response_status.as_deref() == Some("declined")
    });

    Some(RemoteEvent {
        external_id: event.id,
        title: event
            .summary
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "(No title)".to_string()),
        start_time,
        end_time,
        is_all_day,
        location: event.location.filter(|s| !s.trim().is_empty()),
        description: event.description,
        is_declined,
        color: None,
    })
}

fn parse_time(time: &EventDateTime) -> Option<DateTime<Utc>> {
    if let Some(date_time) = &time.date_time {
        return DateTime::parse_from_rfc3339(date_time).ok().map(|dt| dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(time.date.as_deref()?, "%Y-%m-%d").ok()?;
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
}

fn event_time(at: DateTime<Utc>, all_day: bool) -> EventDateTime {
    if all_day {
        EventDateTime { date_time: None, date: Some(at.format("%Y-%m-%d").to_string()) }
    } else {
        EventDateTime {
            date_time: Some(at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            date: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCalendarListResponse {
    #[serde(default)]
    items: Vec<GoogleCalendarListEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCalendarListEntry {
    id: String,
    summary: Option<String>,
    summary_override: Option<String>,
    background_color: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventsResponse {
    #[serde(default)]
    items: Vec<GoogleCalendarEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarEvent {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    start: EventDateTime,
    end: EventDateTime,
    attendees: Option<Vec<GoogleAttendee>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAttendee {
    #[serde(rename = "self", default)]
    is_self: bool,
    response_status: Option<String>,
}

#[derive(Debug, Serialize)]
struct GoogleEventInsert<'a> {
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    start: EventDateTime,
    end: EventDateTime,
}

#[derive(Debug, Deserialize)]
struct GoogleCreatedEvent {
    id: String,
}
