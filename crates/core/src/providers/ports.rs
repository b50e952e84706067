//! Provider adapter contract

use async_trait::async_trait;
use hearthsync_domain::{
    AuthorizationGrant, CalendarProvider, DiscoveredCalendar, MirroredEvent, ProviderError,
    RemoteEvent, SyncWindow, TokenSet,
};

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Parameters embedded in a provider authorization URL.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationRequest<'a> {
    pub state: &'a str,
    pub code_challenge: &'a str,
    pub redirect_uri: &'a str,
}

/// One implementation per external calendar provider.
///
/// Adapters classify every failure into a [`ProviderError`]; they never
/// decide scheduling.
#[async_trait]
pub trait CalendarProviderAdapter: Send + Sync {
    fn provider(&self) -> CalendarProvider;

    /// Build the URL the user is sent to. Only meaningful for OAuth providers.
    fn authorization_url(&self, request: &AuthorizationRequest<'_>) -> ProviderResult<String> {
        let _ = request;
        Err(ProviderError::unknown(format!("{} does not use OAuth", self.provider())))
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> ProviderResult<AuthorizationGrant> {
        let _ = (code, code_verifier, redirect_uri);
        Err(ProviderError::unknown(format!("{} does not use OAuth", self.provider())))
    }

    /// Validate username/app-password credentials (CalDAV family).
    async fn authenticate_basic(
        &self,
        username: &str,
        secret: &str,
    ) -> ProviderResult<AuthorizationGrant> {
        let _ = (username, secret);
        Err(ProviderError::unknown(format!(
            "{} does not accept password credentials",
            self.provider()
        )))
    }

    async fn list_calendars(&self, tokens: &TokenSet) -> ProviderResult<Vec<DiscoveredCalendar>>;

    async fn fetch_events(
        &self,
        tokens: Option<&TokenSet>,
        calendar_id: &str,
        window: SyncWindow,
    ) -> ProviderResult<Vec<RemoteEvent>>;

    /// Create `event` remotely and return its provider id.
    async fn push_event(
        &self,
        tokens: &TokenSet,
        calendar_id: &str,
        event: &MirroredEvent,
    ) -> ProviderResult<String>;

    /// A revoked or invalid refresh token yields an `Auth` error.
    async fn refresh_token(&self, tokens: &TokenSet) -> ProviderResult<TokenSet>;
}

/// Fetches raw feed bodies (ICS subscriptions).
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> ProviderResult<String>;
}
