use std::time::Duration;

use hearthsync_common::ExponentialBackoff;
use hearthsync_core::ProviderResult;
use hearthsync_domain::{HearthSyncError, ProviderError};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::errors::{provider_error_from_http, provider_error_from_status, InfraError};

/// Longest pause between two attempts of one provider request.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Provider-facing HTTP client.
///
/// Every request runs under the configured timeout. Connection failures,
/// timeouts and 5xx answers are retried with exponential backoff until
/// `max_attempts` is used up; anything else goes straight back to the
/// adapter, which owns classification of the final answer.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_attempts: u32,
    backoff: ExponentialBackoff,
}

enum Attempt {
    Done(Response),
    Retry,
    Failed(ProviderError),
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    pub fn new() -> Result<Self, HearthSyncError> {
        Self::builder().build()
    }

    pub fn request<U: reqwest::IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Send with retries and return whatever status the provider answered.
    pub async fn send(&self, builder: RequestBuilder) -> ProviderResult<Response> {
        let mut retries = 0u32;
        loop {
            let request = builder
                .try_clone()
                .ok_or_else(|| ProviderError::unknown("streaming request bodies cannot be retried"))?
                .build()
                .map_err(|err| ProviderError::unknown(format!("invalid request: {err}")))?;

            let last_try = retries + 1 >= self.max_attempts;
            debug!(method = %request.method(), path = request.url().path(), try_no = retries + 1, "provider request");

            match self.attempt(request, last_try).await {
                Attempt::Done(response) => return Ok(response),
                Attempt::Failed(err) => return Err(err),
                Attempt::Retry => {
                    let delay = self.backoff.delay_for(retries);
                    retries += 1;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    async fn attempt(&self, request: reqwest::Request, last_try: bool) -> Attempt {
        match self.client.execute(request).await {
            Ok(response) if response.status().is_server_error() && !last_try => {
                warn!(status = %response.status(), "provider answered with a server error; retrying");
                Attempt::Retry
            }
            Ok(response) => Attempt::Done(response),
            Err(err) if !last_try && is_retryable(&err) => {
                warn!(error = %err, "provider request failed; retrying");
                Attempt::Retry
            }
            Err(err) => Attempt::Failed(provider_error_from_http(&err)),
        }
    }

    /// Send and turn every non-2xx answer into a classified [`ProviderError`].
    pub async fn send_checked(&self, builder: RequestBuilder) -> ProviderResult<Response> {
        let response = self.send(builder).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(provider_error_from_status(status, &headers, &body))
    }

    pub async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ProviderResult<T> {
        self.send_checked(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|err| ProviderError::unknown(format!("malformed provider response: {err}")))
    }

    pub async fn send_text(&self, builder: RequestBuilder) -> ProviderResult<String> {
        self.send_checked(builder).await?.text().await.map_err(|err| provider_error_from_http(&err))
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

fn is_retryable(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request()
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    max_attempts: u32,
    base_backoff: Duration,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30), max_attempts: 2, base_backoff: Duration::from_millis(200) }
    }
}

impl HttpClientBuilder {
    /// Per-request timeout, covering connect and body.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total tries per request, the first one included.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    pub fn build(self) -> Result<HttpClient, HearthSyncError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("hearthsync/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10))
            .no_proxy()
            .build()
            .map_err(|err| HearthSyncError::from(InfraError::from(err)))?;

        Ok(HttpClient {
            client,
            max_attempts: self.max_attempts.max(1),
            backoff: ExponentialBackoff::new(self.base_backoff, MAX_RETRY_DELAY),
        })
    }
}
