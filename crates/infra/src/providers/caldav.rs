//! CalDAV adapter for iCloud and generic CalDAV servers.
//!
//! Credentials are an account name plus an app-specific password, carried
//! in a [`TokenSet`] with `token_type = "Basic"` and the base64 encoded
//! `user:password` pair as the access token. Calendar ids are absolute
//! collection URLs.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hearthsync_common::redact_identifier;
use hearthsync_core::{CalendarProviderAdapter, ProviderResult};
use hearthsync_domain::{
    AuthorizationGrant, CalendarProvider, DiscoveredCalendar, MirroredEvent, ProviderError,
    RemoteEvent, SyncWindow, TokenSet,
};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, IF_NONE_MATCH};
use reqwest::Method;
use roxmltree::{Document, Node};
use tracing::{debug, instrument};
use url::Url;

use super::ics;
use crate::http::HttpClient;

const BASIC_TOKEN_TYPE: &str = "Basic";

const PRINCIPAL_QUERY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop><d:current-user-principal/></d:prop>
</d:propfind>"#;

const HOME_SET_QUERY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop><c:calendar-home-set/></d:prop>
</d:propfind>"#;

const CALENDAR_LIST_QUERY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:" xmlns:ic="http://apple.com/ns/ical/">
  <d:prop>
    <d:displayname/>
    <d:resourcetype/>
    <ic:calendar-color/>
  </d:prop>
</d:propfind>"#;

/// Encode account credentials as a basic-auth token set.
pub fn basic_credentials(username: &str, secret: &str) -> TokenSet {
    TokenSet {
        access_token: STANDARD.encode(format!("{username}:{secret}")),
        refresh_token: None,
        token_type: BASIC_TOKEN_TYPE.to_string(),
        expires_at: None,
        scope: None,
    }
}

/// One adapter instance per CalDAV-family provider.
#[derive(Debug, Clone)]
pub struct CalDavAdapter {
    http: HttpClient,
    provider: CalendarProvider,
    endpoint: String,
}

impl CalDavAdapter {
    pub fn new(http: HttpClient, provider: CalendarProvider, endpoint: impl Into<String>) -> Self {
        Self { http, provider, endpoint: endpoint.into() }
    }

    pub fn icloud(http: HttpClient, endpoint: impl Into<String>) -> Self {
        Self::new(http, CalendarProvider::ICloud, endpoint)
    }

    async fn propfind(
        &self,
        tokens: &TokenSet,
        url: &Url,
        depth: &str,
        body: &'static str,
    ) -> ProviderResult<String> {
        let builder = self
            .http
            .request(dav_method("PROPFIND")?, url.clone())
            .header(AUTHORIZATION, authorization(tokens)?)
            .header("Depth", depth)
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(body);
        self.http.send_text(builder).await
    }

    /// Principal, then calendar home. Returns the absolute home URL.
    async fn discover_home(&self, tokens: &TokenSet) -> ProviderResult<Url> {
        let endpoint = parse_url(&self.endpoint)?;

        let body = self.propfind(tokens, &endpoint, "0", PRINCIPAL_QUERY).await?;
        let principal_href = first_href_under(&body, "current-user-principal")?
            .ok_or_else(|| ProviderError::unknown("server did not report a principal"))?;
        let principal = join(&endpoint, &principal_href)?;

        let body = self.propfind(tokens, &principal, "0", HOME_SET_QUERY).await?;
        let home_href = first_href_under(&body, "calendar-home-set")?
            .ok_or_else(|| ProviderError::unknown("server did not report a calendar home"))?;
        let home = join(&principal, &home_href)?;
        debug!(home = %home.path(), "discovered calendar home");
        Ok(home)
    }
}

#[async_trait]
impl CalendarProviderAdapter for CalDavAdapter {
    fn provider(&self) -> CalendarProvider {
        self.provider
    }

    #[instrument(skip_all, fields(provider = %self.provider))]
    async fn authenticate_basic(
        &self,
        username: &str,
        secret: &str,
    ) -> ProviderResult<AuthorizationGrant> {
        if username.trim().is_empty() || secret.is_empty() {
            return Err(ProviderError::auth("username and password are required"));
        }
        let username = username.trim();
        let tokens = basic_credentials(username, secret);
        self.discover_home(&tokens).await?;
        debug!(
            provider = %self.provider,
            account = %redact_identifier(username),
            "CalDAV credentials accepted"
        );
        Ok(AuthorizationGrant { tokens, external_account_id: username.to_string() })
    }

    #[instrument(skip_all, fields(provider = %self.provider))]
    async fn list_calendars(&self, tokens: &TokenSet) -> ProviderResult<Vec<DiscoveredCalendar>> {
        let home = self.discover_home(tokens).await?;
        let body = self.propfind(tokens, &home, "1", CALENDAR_LIST_QUERY).await?;
        parse_calendar_list(&body, &home)
    }

    #[instrument(skip(self, tokens), fields(provider = %self.provider))]
    async fn fetch_events(
        &self,
        tokens: Option<&TokenSet>,
        calendar_id: &str,
        window: SyncWindow,
    ) -> ProviderResult<Vec<RemoteEvent>> {
        let tokens = tokens.ok_or_else(|| ProviderError::auth("missing CalDAV credentials"))?;
        let calendar = parse_url(calendar_id)?;
        let body = calendar_query(&window);

        let builder = self
            .http
            .request(dav_method("REPORT")?, calendar)
            .header(AUTHORIZATION, authorization(tokens)?)
            .header("Depth", "1")
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(body);
        let xml = self.http.send_text(builder).await?;

        let mut events = Vec::new();
        for data in calendar_data(&xml)? {
            events.extend(ics::parse_events(&data)?);
        }
        debug!(count = events.len(), "fetched CalDAV events");
        Ok(events)
    }

    #[instrument(skip(self, tokens, event), fields(provider = %self.provider, event_id = %event.id))]
    async fn push_event(
        &self,
        tokens: &TokenSet,
        calendar_id: &str,
        event: &MirroredEvent,
    ) -> ProviderResult<String> {
        let uid = event.id.to_string();
        let resource = parse_url(&format!("{}/{uid}.ics", calendar_id.trim_end_matches('/')))?;

        let builder = self
            .http
            .request(Method::PUT, resource)
            .header(AUTHORIZATION, authorization(tokens)?)
            .header(CONTENT_TYPE, "text/calendar; charset=utf-8")
            .header(IF_NONE_MATCH, "*")
            .body(ics::render_event(event, &uid));
        self.http.send_checked(builder).await?;
        Ok(uid)
    }

    async fn refresh_token(&self, tokens: &TokenSet) -> ProviderResult<TokenSet> {
        Ok(tokens.clone())
    }
}

fn dav_method(name: &str) -> ProviderResult<Method> {
    Method::from_bytes(name.as_bytes())
        .map_err(|err| ProviderError::unknown(format!("invalid method {name}: {err}")))
}

fn authorization(tokens: &TokenSet) -> ProviderResult<String> {
    if tokens.token_type.eq_ignore_ascii_case(BASIC_TOKEN_TYPE) {
        Ok(format!("Basic {}", tokens.access_token))
    } else {
        Err(ProviderError::auth("CalDAV requires password credentials"))
    }
}

fn parse_url(raw: &str) -> ProviderResult<Url> {
    Url::parse(raw).map_err(|err| ProviderError::unknown(format!("invalid CalDAV url: {err}")))
}

fn join(base: &Url, href: &str) -> ProviderResult<Url> {
    base.join(href.trim())
        .map_err(|err| ProviderError::unknown(format!("invalid href {href}: {err}")))
}

fn parse_xml(body: &str) -> ProviderResult<Document<'_>> {
    Document::parse(body)
        .map_err(|err| ProviderError::unknown(format!("malformed multistatus response: {err}")))
}

fn named<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.descendants().find(|n| n.is_element() && n.tag_name().name() == name)
}

fn text_of(node: Node<'_, '_>, name: &str) -> Option<String> {
    named(node, name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_href_under(body: &str, property: &str) -> ProviderResult<Option<String>> {
    let doc = parse_xml(body)?;
    Ok(named(doc.root_element(), property).and_then(|prop| text_of(prop, "href")))
}

fn parse_calendar_list(body: &str, home: &Url) -> ProviderResult<Vec<DiscoveredCalendar>> {
    let doc = parse_xml(body)?;
    let mut calendars = Vec::new();

    for response in
        doc.root_element().descendants().filter(|n| n.tag_name().name() == "response")
    {
        let is_calendar = named(response, "resourcetype")
            .is_some_and(|rt| rt.children().any(|c| c.tag_name().name() == "calendar"));
        if !is_calendar {
            continue;
        }
        let Some(href) = text_of(response, "href") else { continue };
        let url = join(home, &href)?;
        if url.path().trim_end_matches('/') == home.path().trim_end_matches('/') {
            continue;
        }

        let display_name = text_of(response, "displayname").unwrap_or_else(|| {
            url.path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .unwrap_or("Calendar")
                .to_string()
        });

        // iCloud reports #RRGGBBAA.
        let default_color = text_of(response, "calendar-color").map(|color| {
            if color.len() == 9 && color.starts_with('#') {
                color[..7].to_string()
            } else {
                color
            }
        });

        calendars.push(DiscoveredCalendar { external_id: url.to_string(), display_name, default_color });
    }

    Ok(calendars)
}

fn calendar_query(window: &SyncWindow) -> String {
    let start = window.start.format("%Y%m%dT%H%M%SZ");
    let end = window.end.format("%Y%m%dT%H%M%SZ");
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<c:calendar-query xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop>
    <d:getetag/>
    <c:calendar-data/>
  </d:prop>
  <c:filter>
    <c:comp-filter name="VCALENDAR">
      <c:comp-filter name="VEVENT">
        <c:time-range start="{start}" end="{end}"/>
      </c:comp-filter>
    </c:comp-filter>
  </c:filter>
</c:calendar-query>"#
    )
}

fn calendar_data(body: &str) -> ProviderResult<Vec<String>> {
    let doc = parse_xml(body)?;
    Ok(doc
        .root_element()
        .descendants()
        .filter(|n| n.tag_name().name() == "response")
        .filter_map(|response| named(response, "calendar-data").and_then(|n| n.text()))
        .map(str::to_string)
        .collect())
}
