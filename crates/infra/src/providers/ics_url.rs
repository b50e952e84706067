//! Read-only ICS subscription feeds
//!
//! The connection's calendar id is the normalised feed URL; there are no
//! credentials to exchange or refresh.

use std::sync::Arc;

use async_trait::async_trait;
use hearthsync_core::ics::normalize_feed_url;
use hearthsync_core::{CalendarProviderAdapter, FeedFetcher, ProviderResult};
use hearthsync_domain::constants::MAX_ICS_BYTES;
use hearthsync_domain::{
    CalendarProvider, DiscoveredCalendar, MirroredEvent, ProviderError, RemoteEvent, SyncWindow,
    TokenSet,
};
use reqwest::header::ACCEPT;
use reqwest::Method;
use tracing::{debug, instrument};

use super::ics;
use crate::http::HttpClient;

/// Downloads feed bodies over HTTP, refusing anything larger than
/// `max_bytes`.
#[derive(Debug, Clone)]
pub struct HttpFeedFetcher {
    http: HttpClient,
    max_bytes: usize,
}

impl HttpFeedFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http, max_bytes: MAX_ICS_BYTES }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    #[instrument(skip(self))]
    async fn fetch_text(&self, url: &str) -> ProviderResult<String> {
        let builder = self
            .http
            .request(Method::GET, url)
            .header(ACCEPT, "text/calendar, text/plain;q=0.9, */*;q=0.5");
        let mut response = self.http.send_checked(builder).await?;

        if response.content_length().is_some_and(|len| len > self.max_bytes as u64) {
            return Err(ProviderError::unknown(format!(
                "feed exceeds {} bytes",
                self.max_bytes
            )));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| ProviderError::transient(format!("feed download failed: {err}")))?
        {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(ProviderError::unknown(format!(
                    "feed exceeds {} bytes",
                    self.max_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }

        debug!(bytes = body.len(), "downloaded feed");
        String::from_utf8(body)
            .map_err(|_| ProviderError::unknown("feed is not valid UTF-8 text"))
    }
}

/// Adapter for [`CalendarProvider::IcsUrl`] connections.
pub struct IcsFeedAdapter {
    fetcher: Arc<dyn FeedFetcher>,
}

impl IcsFeedAdapter {
    pub fn new(fetcher: Arc<dyn FeedFetcher>) -> Self {
        Self { fetcher }
    }
}

impl std::fmt::Debug for IcsFeedAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcsFeedAdapter").finish_non_exhaustive()
    }
}

#[async_trait]
impl CalendarProviderAdapter for IcsFeedAdapter {
    fn provider(&self) -> CalendarProvider {
        CalendarProvider::IcsUrl
    }

    async fn list_calendars(&self, _tokens: &TokenSet) -> ProviderResult<Vec<DiscoveredCalendar>> {
        Err(ProviderError::unknown("ICS subscriptions have no calendar list"))
    }

    #[instrument(skip(self, _tokens), fields(provider = "ics_url"))]
    async fn fetch_events(
        &self,
        _tokens: Option<&TokenSet>,
        calendar_id: &str,
        window: SyncWindow,
    ) -> ProviderResult<Vec<RemoteEvent>> {
        let url = normalize_feed_url(calendar_id).map_err(ProviderError::unknown)?;
        let body = self.fetcher.fetch_text(url.as_str()).await?;
        let events = ics::parse_events(&body)?;
        debug!(count = events.len(), window_start = %window.start, "parsed feed events");
        Ok(events)
    }

    async fn push_event(
        &self,
        _tokens: &TokenSet,
        _calendar_id: &str,
        _event: &MirroredEvent,
    ) -> ProviderResult<String> {
        Err(ProviderError::unknown("ICS subscriptions are read-only"))
    }

    async fn refresh_token(&self, tokens: &TokenSet) -> ProviderResult<TokenSet> {
        Ok(tokens.clone())
    }
}
