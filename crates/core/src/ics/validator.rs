//! ICS subscription URL validation
//!
//! Fetches the feed once with a bounded timeout and checks that it looks like
//! an iCalendar document. Nothing is persisted.

use std::sync::Arc;
use std::time::Duration;

use hearthsync_domain::constants::ICS_CALENDAR_PREFIX;
use hearthsync_domain::IcsValidationResult;
use icalendar::parser::{read_calendar, unfold};
use tracing::{debug, instrument};
use url::Url;

use crate::providers::FeedFetcher;

/// Normalise a user supplied feed URL. `webcal://` is served over HTTPS.
pub fn normalize_feed_url(raw: &str) -> Result<Url, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("URL is required".to_string());
    }
    let mut url = Url::parse(trimmed).map_err(|err| format!("invalid URL: {err}"))?;
    match url.scheme() {
        "http" | "https" => {}
        "webcal" | "webcals" => {
            let rewritten = format!("https{}", &url.as_str()[url.scheme().len()..]);
            url = Url::parse(&rewritten).map_err(|err| format!("invalid URL: {err}"))?;
        }
        other => return Err(format!("unsupported URL scheme: {other}")),
    }
    if url.host_str().is_none() {
        return Err("URL has no host".to_string());
    }
    Ok(url)
}

/// Check a fetched body and pull out its `X-WR-CALNAME`, if any.
pub fn inspect_feed(body: &str) -> IcsValidationResult {
    let content = body.trim_start_matches('\u{feff}').trim_start();
    let has_prefix = content
        .get(..ICS_CALENDAR_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(ICS_CALENDAR_PREFIX));
    if !has_prefix {
        return IcsValidationResult::invalid("response is not an iCalendar feed");
    }
    IcsValidationResult::valid(calendar_name(content))
}

fn calendar_name(content: &str) -> Option<String> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).ok()?;
    calendar
        .properties
        .iter()
        .find(|p| p.name.as_ref().eq_ignore_ascii_case("X-WR-CALNAME"))
        .map(|p| p.val.as_ref().trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Validates ICS URLs through a [`FeedFetcher`].
pub struct IcsValidator {
    fetcher: Arc<dyn FeedFetcher>,
    timeout: Duration,
}

impl IcsValidator {
    pub fn new(fetcher: Arc<dyn FeedFetcher>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    #[instrument(skip(self))]
    pub async fn validate(&self, raw_url: &str) -> IcsValidationResult {
        let url = match normalize_feed_url(raw_url) {
            Ok(url) => url,
            Err(reason) => return IcsValidationResult::invalid(reason),
        };

        let body = match tokio::time::timeout(self.timeout, self.fetcher.fetch_text(url.as_str()))
            .await
        {
            Ok(Ok(body)) => body,
            Ok(Err(err)) => return IcsValidationResult::invalid(err.message),
            Err(_) => {
                return IcsValidationResult::invalid(format!(
                    "feed did not respond within {}s",
                    self.timeout.as_secs()
                ))
            }
        };

        let result = inspect_feed(&body);
        debug!(valid = result.valid, name = ?result.calendar_name, "inspected ics feed");
        result
    }
}
