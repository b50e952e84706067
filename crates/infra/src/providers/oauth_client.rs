//! Authorization-code + PKCE client shared by the OAuth providers.
//!
//! Builds authorization URLs, exchanges codes and refreshes tokens against a
//! standard RFC 6749 token endpoint.

use chrono::{Duration, Utc};
use hearthsync_core::{AuthorizationRequest, ProviderResult};
use hearthsync_domain::{OAuthClientConfig, ProviderError, TokenSet};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::errors::provider_error_from_status;
use crate::http::HttpClient;

/// Token endpoint client for one provider registration.
#[derive(Clone)]
pub struct OAuthTokenClient {
    http: HttpClient,
    client_id: String,
    client_secret: Option<String>,
    auth_endpoint: String,
    token_endpoint: String,
    scopes: Vec<String>,
    extra_authorize_params: Vec<(String, String)>,
}

impl OAuthTokenClient {
    /// Build from configuration, falling back to the provider defaults for
    /// endpoints the configuration leaves unset.
    pub fn from_config(
        http: HttpClient,
        config: &OAuthClientConfig,
        default_auth_endpoint: &str,
        default_token_endpoint: &str,
    ) -> Self {
        Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            auth_endpoint: config
                .auth_endpoint
                .clone()
                .unwrap_or_else(|| default_auth_endpoint.to_string()),
            token_endpoint: config
                .token_endpoint
                .clone()
                .unwrap_or_else(|| default_token_endpoint.to_string()),
            scopes: Vec::new(),
            extra_authorize_params: Vec::new(),
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_authorize_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_authorize_params.push((key.into(), value.into()));
        self
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Provider consent URL carrying state and the S256 challenge.
    pub fn authorization_url(&self, request: &AuthorizationRequest<'_>) -> ProviderResult<String> {
        let mut url = Url::parse(&self.auth_endpoint).map_err(|err| {
            ProviderError::unknown(format!("invalid authorization endpoint: {err}"))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", request.redirect_uri)
                .append_pair("scope", &self.scopes.join(" "))
                .append_pair("state", request.state)
                .append_pair("code_challenge", request.code_challenge)
                .append_pair("code_challenge_method", "S256");
            for (key, value) in &self.extra_authorize_params {
                query.append_pair(key, value);
            }
        }

        Ok(url.into())
    }

    #[instrument(skip_all)]
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> ProviderResult<TokenSet> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self.post_form(&form).await?;
        debug!("authorization code exchanged");
        Ok(response.into_token_set(None))
    }

    /// Refresh `tokens`. Providers that do not rotate refresh tokens omit
    /// one from the response; the previous value is kept.
    #[instrument(skip_all)]
    pub async fn refresh(&self, tokens: &TokenSet) -> ProviderResult<TokenSet> {
        let refresh_token = tokens
            .refresh_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ProviderError::auth("no refresh token available; reauthorize"))?;

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self.post_form(&form).await?;
        debug!("access token refreshed");
        Ok(response.into_token_set(Some(refresh_token)))
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> ProviderResult<TokenResponse> {
        let builder = self.http.request(Method::POST, &self.token_endpoint).form(form);
        let response = self.http.send(builder).await?;
        let status = response.status();

        if status.is_success() {
            return response.json::<TokenResponse>().await.map_err(|err| {
                ProviderError::unknown(format!("malformed token response: {err}"))
            });
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(classify_token_failure(status, &headers, &body))
    }
}

impl std::fmt::Debug for OAuthTokenClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenClient")
            .field("client_id", &self.client_id)
            .field("auth_endpoint", &self.auth_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// `invalid_grant` means the code or refresh token is dead; the user has
/// to authorize again.
fn classify_token_failure(
    status: StatusCode,
    headers: &reqwest::header::HeaderMap,
    body: &str,
) -> ProviderError {
    let oauth_error = serde_json::from_str::<TokenErrorBody>(body).ok();
    match oauth_error.as_ref().map(|e| e.error.as_str()) {
        Some("invalid_grant" | "invalid_client" | "unauthorized_client") => {
            warn!(%status, "token endpoint rejected grant");
            let detail = oauth_error
                .as_ref()
                .and_then(|e| e.error_description.clone())
                .unwrap_or_else(|| "grant rejected".to_string());
            ProviderError::auth(format!("token endpoint rejected grant: {detail}"))
        }
        _ => provider_error_from_status(status, headers, body),
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_token_set(self, previous_refresh: Option<&str>) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or_else(|| previous_refresh.map(str::to_string)),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at: self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
            scope: self.scope,
        }
    }
}
