//! Calendar provider adapters
//!
//! One [`CalendarProviderAdapter`](hearthsync_core::CalendarProviderAdapter)
//! per external provider, plus the shared OAuth token client and ICS
//! mapping used by several of them.

pub mod caldav;
pub mod google;
pub mod ics;
pub mod ics_url;
pub mod oauth_client;
pub mod outlook;

use std::sync::Arc;

use hearthsync_core::{FeedFetcher, ProviderRegistry, ProviderResult};
use hearthsync_domain::{CalendarProvider, Config, ProviderError};
use tracing::info;
use url::Url;

pub use caldav::{basic_credentials, CalDavAdapter};
pub use google::GoogleCalendarAdapter;
pub use ics_url::{HttpFeedFetcher, IcsFeedAdapter};
pub use oauth_client::OAuthTokenClient;
pub use outlook::OutlookCalendarAdapter;

use crate::http::HttpClient;

/// Append percent-encoded path segments to `base`.
pub(crate) fn api_url(base: &str, segments: &[&str]) -> ProviderResult<Url> {
    let mut url = Url::parse(base)
        .map_err(|err| ProviderError::unknown(format!("invalid API base url {base}: {err}")))?;
    url.path_segments_mut()
        .map_err(|()| ProviderError::unknown(format!("API base url cannot hold a path: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Register every adapter the configuration enables.
///
/// OAuth providers need a client registration; iCloud and ICS feeds are
/// always available, generic CalDAV only with a server url.
pub fn build_registry(
    config: &Config,
    http: &HttpClient,
    fetcher: Arc<dyn FeedFetcher>,
) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new()
        .with(Arc::new(CalDavAdapter::icloud(http.clone(), config.caldav.icloud_endpoint.clone())))
        .with(Arc::new(IcsFeedAdapter::new(fetcher)));

    if let Some(google) = &config.oauth.google {
        registry.register(Arc::new(GoogleCalendarAdapter::new(http.clone(), google)));
    }
    if let Some(outlook) = &config.oauth.outlook {
        registry.register(Arc::new(OutlookCalendarAdapter::new(http.clone(), outlook)));
    }
    if let Some(server) = &config.caldav.server_url {
        registry.register(Arc::new(CalDavAdapter::new(
            http.clone(),
            CalendarProvider::CalDav,
            server.clone(),
        )));
    }

    info!(providers = ?registry.providers().collect::<Vec<_>>(), "provider adapters registered");
    registry
}
