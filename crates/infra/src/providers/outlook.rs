//! Microsoft Graph (Outlook) calendar provider implementation

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use hearthsync_core::{AuthorizationRequest, CalendarProviderAdapter, ProviderResult};
use hearthsync_domain::{
    AuthorizationGrant, CalendarProvider, DiscoveredCalendar, MirroredEvent, OAuthClientConfig,
    ProviderError, RemoteEvent, SyncWindow, TokenSet,
};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use super::api_url;
use super::oauth_client::OAuthTokenClient;
use crate::http::HttpClient;

pub const MICROSOFT_AUTH_ENDPOINT: &str =
    "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
pub const MICROSOFT_TOKEN_ENDPOINT: &str =
    "https://login.microsoftonline.com/common/oauth2/v2.0/token";
pub const MICROSOFT_GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

const OUTLOOK_SCOPES: [&str; 4] = ["offline_access", "openid", "email", "Calendars.ReadWrite"];
const OUTLOOK_TIMEZONE_HEADER: &str = r#"outlook.timezone="UTC""#;
const GRAPH_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Outlook / Microsoft 365 calendar adapter
#[derive(Debug, Clone)]
pub struct OutlookCalendarAdapter {
    oauth: OAuthTokenClient,
    api_base: String,
}

impl OutlookCalendarAdapter {
    pub fn new(http: HttpClient, config: &OAuthClientConfig) -> Self {
        let oauth = OAuthTokenClient::from_config(
            http,
            config,
            MICROSOFT_AUTH_ENDPOINT,
            MICROSOFT_TOKEN_ENDPOINT,
        )
        .with_scopes(OUTLOOK_SCOPES);

        Self {
            oauth,
            api_base: config
                .api_base_url
                .clone()
                .unwrap_or_else(|| MICROSOFT_GRAPH_API_BASE.to_string()),
        }
    }

    fn http(&self) -> &HttpClient {
        self.oauth.http()
    }

    fn get(&self, tokens: &TokenSet, url: Url) -> RequestBuilder {
        self.http()
            .request(Method::GET, url)
            .bearer_auth(&tokens.access_token)
            .header("Prefer", OUTLOOK_TIMEZONE_HEADER)
    }

    async fn get_json<T: DeserializeOwned>(&self, tokens: &TokenSet, url: Url) -> ProviderResult<T> {
        self.http().send_json(self.get(tokens, url)).await
    }

    /// Follow `@odata.nextLink` until the collection is exhausted.
    async fn collect_pages<T: DeserializeOwned>(
        &self,
        tokens: &TokenSet,
        first: Url,
    ) -> ProviderResult<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next.take() {
            let page: GraphCollection<T> = self.get_json(tokens, url).await?;
            items.extend(page.value);
            next = page
                .next_link
                .map(|link| {
                    Url::parse(&link).map_err(|err| {
                        ProviderError::unknown(format!("invalid nextLink from Graph: {err}"))
                    })
                })
                .transpose()?;
        }
        Ok(items)
    }

    fn calendar_path<'a>(calendar_id: &'a str, leaf: &'a str) -> Vec<&'a str> {
        if calendar_id.eq_ignore_ascii_case("primary") {
            vec!["me", leaf]
        } else {
            vec!["me", "calendars", calendar_id, leaf]
        }
    }
}

#[async_trait]
impl CalendarProviderAdapter for OutlookCalendarAdapter {
    fn provider(&self) -> CalendarProvider {
        CalendarProvider::Outlook
    }

    fn authorization_url(&self, request: &AuthorizationRequest<'_>) -> ProviderResult<String> {
        self.oauth.authorization_url(request)
    }

    #[instrument(skip_all, fields(provider = "outlook"))]
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> ProviderResult<AuthorizationGrant> {
        let tokens = self.oauth.exchange_code(code, code_verifier, redirect_uri).await?;
        let me: GraphUser = self.get_json(&tokens, api_url(&self.api_base, &["me"])?).await?;
        let external_account_id = me.mail.or(me.user_principal_name).unwrap_or(me.id);
        Ok(AuthorizationGrant { tokens, external_account_id })
    }

    #[instrument(skip_all, fields(provider = "outlook"))]
    async fn list_calendars(&self, tokens: &TokenSet) -> ProviderResult<Vec<DiscoveredCalendar>> {
        let url = api_url(&self.api_base, &["me", "calendars"])?;
        let calendars: Vec<GraphCalendar> = self.collect_pages(tokens, url).await?;
        Ok(calendars
            .into_iter()
            .map(|calendar| DiscoveredCalendar {
                display_name: calendar.name.unwrap_or_else(|| calendar.id.clone()),
                external_id: calendar.id,
                default_color: calendar.hex_color.filter(|c| !c.is_empty()),
            })
            .collect())
    }

    #[instrument(skip(self, tokens), fields(provider = "outlook"))]
    async fn fetch_events(
        &self,
        tokens: Option<&TokenSet>,
        calendar_id: &str,
        window: SyncWindow,
    ) -> ProviderResult<Vec<RemoteEvent>> {
        let tokens = tokens.ok_or_else(|| ProviderError::auth("missing Outlook credentials"))?;
        let mut url = api_url(&self.api_base, &Self::calendar_path(calendar_id, "calendarView"))?;
        url.query_pairs_mut()
            .append_pair("startDateTime", &window.start.to_rfc3339_opts(SecondsFormat::Secs, true))
            .append_pair("endDateTime", &window.end.to_rfc3339_opts(SecondsFormat::Secs, true));

        let raw: Vec<GraphEvent> = self.collect_pages(tokens, url).await?;
        let events: Vec<RemoteEvent> = raw.into_iter().filter_map(to_remote_event).collect();
        debug!(count = events.len(), "fetched Outlook events");
        Ok(events)
    }

    #[instrument(skip(self, tokens, event), fields(provider = "outlook", event_id = %event.id))]
    async fn push_event(
        &self,
        tokens: &TokenSet,
        calendar_id: &str,
        event: &MirroredEvent,
    ) -> ProviderResult<String> {
        let url = api_url(&self.api_base, &Self::calendar_path(calendar_id, "events"))?;
        let body = GraphEventInsert {
            subject: &event.title,
            is_all_day: event.is_all_day,
            start: graph_time(event.start_time),
            end: graph_time(event.end_time),
            location: event.location.as_deref().map(|name| GraphLocation {
                display_name: name.to_string(),
            }),
        };
        let builder = self
            .http()
            .request(Method::POST, url)
            .bearer_auth(&tokens.access_token)
            .json(&body);
        let created: GraphCreated = self.http().send_json(builder).await?;
        Ok(created.id)
    }

    async fn refresh_token(&self, tokens: &TokenSet) -> ProviderResult<TokenSet> {
        self.oauth.refresh(tokens).await
    }
}

fn to_remote_event(event: GraphEvent) -> Option<RemoteEvent> {
    if event.is_cancelled {
        return None;
    }

    let (Some(start_time), Some(end_time)) = (parse_graph_time(&event.start), parse_graph_time(&event.end))
    else {
        warn!(event_id = %event.id, "skipping event with unparseable times");
        return None;
    };

    let is_declined = event
        .response_status
        .as_ref()
        .is_some_and(|status| status.response.eq_ignore_ascii_case("declined"));

    Some(RemoteEvent {
        external_id: event.id,
        title: event
            .subject
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "(No title)".to_string()),
        start_time,
        end_time,
        is_all_day: event.is_all_day,
        location: event
            .location
            .and_then(|location| location.display_name)
            .filter(|s| !s.trim().is_empty()),
        description: event.body_preview.filter(|s| !s.is_empty()),
        is_declined,
        color: None,
    })
}

/// Graph returns `2025-03-10T09:00:00.0000000` in the zone requested by the
/// `Prefer` header, which is always UTC here.
fn parse_graph_time(time: &GraphDateTime) -> Option<DateTime<Utc>> {
    let value = time.date_time.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(value, GRAPH_DATETIME_FORMAT).ok().map(|dt| dt.and_utc())
}

fn graph_time(at: DateTime<Utc>) -> GraphDateTime {
    GraphDateTime {
        date_time: at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        time_zone: Some("UTC".to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct GraphCollection<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    id: String,
    mail: Option<String>,
    user_principal_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphCalendar {
    id: String,
    name: Option<String>,
    hex_color: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphEvent {
    id: String,
    subject: Option<String>,
    body_preview: Option<String>,
    start: GraphDateTime,
    end: GraphDateTime,
    #[serde(default)]
    is_all_day: bool,
    #[serde(default)]
    is_cancelled: bool,
    location: Option<GraphLocationRead>,
    response_status: Option<GraphResponseStatus>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphDateTime {
    date_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphLocationRead {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphResponseStatus {
    response: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphEventInsert<'a> {
    subject: &'a str,
    is_all_day: bool,
    start: GraphDateTime,
    end: GraphDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<GraphLocation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphLocation {
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct GraphCreated {
    id: String,
}
