//! HTTP front door
//!
//! Endpoints (all JSON unless noted):
//! - POST   /api/v1/oauth/sessions                        - start an OAuth authorization
//! - POST   /api/v1/oauth/sessions/complete               - exchange the callback code
//! - POST   /api/v1/oauth/sessions/{id}/connections       - connect selected calendars
//! - POST   /api/v1/credential-sessions                   - iCloud / CalDAV sign-in
//! - POST   /api/v1/ics/validate                          - check an ICS feed
//! - GET    /api/v1/families/{id}/connections             - list a family's connections
//! - POST   /api/v1/families/{id}/ics-connections         - subscribe to an ICS feed
//! - GET    /api/v1/families/{id}/events                  - change notifications (SSE)
//! - POST   /api/v1/connections/{id}/pause|resume|sync
//! - DELETE /api/v1/connections/{id}                      - disconnect
//! - GET    /health

pub mod connections;
pub mod events;
pub mod oauth;

use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use hearthsync_domain::{HearthSyncError, SyncErrorKind};
use hearthsync_infra::SyncMetricsSnapshot;
use serde::Serialize;
use tracing::error;

use crate::AppContext;

pub type AppState = Arc<AppContext>;

/// Build the full router over a shared context.
pub fn router(context: AppState) -> Router {
    let api = Router::new()
        .merge(oauth::router())
        .merge(connections::router())
        .merge(events::router());

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health))
        .with_state(context)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    scheduler_running: bool,
    metrics: SyncMetricsSnapshot,
}

/// GET /health
async fn health(
    axum::extract::State(context): axum::extract::State<AppState>,
) -> Result<Json<HealthResponse>, ApiError> {
    let db = context.db.clone();
    tokio::task::spawn_blocking(move || db.health_check())
        .await
        .map_err(|err| HearthSyncError::Internal(format!("health check task failed: {err}")))??;

    Ok(Json(HealthResponse {
        status: "ok",
        scheduler_running: context.scheduler_running().await,
        metrics: context.metrics.snapshot(),
    }))
}

/// Error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Maps engine errors onto HTTP responses.
#[derive(Debug)]
pub struct ApiError(pub HearthSyncError);

impl From<HearthSyncError> for ApiError {
    fn from(err: HearthSyncError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            HearthSyncError::Validation(_)
            | HearthSyncError::StateMismatch(_)
            | HearthSyncError::RedirectUriMismatch(_) => StatusCode::BAD_REQUEST,
            HearthSyncError::NotFound(_) => StatusCode::NOT_FOUND,
            HearthSyncError::InvalidSession(_) => StatusCode::GONE,
            HearthSyncError::SessionAlreadyConsumed(_)
            | HearthSyncError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
            HearthSyncError::Provider(err) => match err.kind {
                SyncErrorKind::Auth => StatusCode::UNAUTHORIZED,
                SyncErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                SyncErrorKind::Transient | SyncErrorKind::Unknown => StatusCode::BAD_GATEWAY,
            },
            HearthSyncError::Network(_) => StatusCode::BAD_GATEWAY,
            HearthSyncError::Database(_)
            | HearthSyncError::Config(_)
            | HearthSyncError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after_secs = match &self.0 {
            HearthSyncError::Provider(err) => err.retry_after_secs,
            _ => None,
        };

        // Store and internal details stay in the logs.
        let message = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            error!(error = %self.0, "request failed");
            "internal error".to_string()
        } else {
            self.0.to_string()
        };

        let body = ErrorResponse { error: self.0.label(), message, retry_after_secs };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
