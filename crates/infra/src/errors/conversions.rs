//! Conversions from external infrastructure errors into domain errors.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hearthsync_domain::{HearthSyncError, ProviderError};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Error as HttpError, StatusCode};
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub HearthSyncError);

impl From<InfraError> for HearthSyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<HearthSyncError> for InfraError {
    fn from(value: HearthSyncError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoHearthSyncError {
    fn into_hearthsync(self) -> HearthSyncError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → HearthSyncError */
/* -------------------------------------------------------------------------- */

impl IntoHearthSyncError for SqlError {
    fn into_hearthsync(self) -> HearthSyncError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        HearthSyncError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        HearthSyncError::Database("database is locked".into())
                    }
                    // UNIQUE / PRIMARY KEY: the row or its live key already exists.
                    (ErrorCode::ConstraintViolation, 2067 | 1555) => {
                        HearthSyncError::ConcurrencyConflict(format!(
                            "unique constraint violation: {message}"
                        ))
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        HearthSyncError::Database("foreign key constraint violation".into())
                    }
                    _ => HearthSyncError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => {
                HearthSyncError::NotFound("no rows returned by query".into())
            }
            RE::FromSqlConversionFailure(_, _, cause) => {
                HearthSyncError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                HearthSyncError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => {
                HearthSyncError::Database("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidParameterName(parameter_name) => {
                HearthSyncError::Database(format!("invalid parameter name: {parameter_name}"))
            }
            RE::InvalidPath(path) => HearthSyncError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            RE::InvalidQuery => HearthSyncError::Database("invalid SQL query".into()),
            other => HearthSyncError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_hearthsync())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → HearthSyncError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(HearthSyncError::Database(format!("connection pool exhausted: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → HearthSyncError */
/* -------------------------------------------------------------------------- */

impl IntoHearthSyncError for HttpError {
    fn into_hearthsync(self) -> HearthSyncError {
        if self.is_timeout() {
            return HearthSyncError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return HearthSyncError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            return HearthSyncError::Provider(provider_error_from_status(
                status,
                &HeaderMap::new(),
                "",
            ));
        }

        HearthSyncError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_hearthsync())
    }
}

/* -------------------------------------------------------------------------- */
/* Provider failure classification */
/* -------------------------------------------------------------------------- */

/// Classify a transport-level failure from a provider call.
pub fn provider_error_from_http(err: &HttpError) -> ProviderError {
    if err.is_timeout() {
        return ProviderError::transient("provider request timed out");
    }
    if err.is_connect() {
        return ProviderError::transient(format!("provider connection failure: {err}"));
    }
    if let Some(status) = err.status() {
        return provider_error_from_status(status, &HeaderMap::new(), "");
    }
    if err.is_decode() || err.is_body() {
        return ProviderError::unknown(format!("malformed provider response: {err}"));
    }
    ProviderError::transient(err.to_string())
}

/// Classify a non-success HTTP response.
///
/// 401/403 are auth failures, 429 is rate limited (honouring `Retry-After`),
/// 408 and 5xx are transient, everything else is unknown.
pub fn provider_error_from_status(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> ProviderError {
    let reason = status.canonical_reason().unwrap_or("unknown status");
    let detail = body.trim();
    let message = if detail.is_empty() {
        format!("HTTP {} {reason}", status.as_u16())
    } else {
        format!("HTTP {} {reason}: {}", status.as_u16(), truncate(detail, 200))
    };

    match status.as_u16() {
        401 | 403 => ProviderError::auth(message),
        429 => {
            let retry_after = headers
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| parse_retry_after(value, Utc::now()))
                .map(|delay| delay.as_secs());
            ProviderError::rate_limited(message, retry_after)
        }
        408 | 500..=599 => ProviderError::transient(message),
        _ => ProviderError::unknown(message),
    }
}

/// Parse a `Retry-After` header: either delta-seconds or an HTTP date.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    let delta = (at - now).num_seconds().max(0);
    u64::try_from(delta).ok().map(Duration::from_secs)
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
