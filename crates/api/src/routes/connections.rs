//! Connection lifecycle and ICS endpoints

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use hearthsync_core::{IcsSubscription, SkipReason, SyncAttempt};
use hearthsync_domain::{
    CalendarConnection, ConnectionStatus, IcsValidationResult, SyncOutcome, SyncSettings,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ics/validate", post(validate_ics))
        .route("/families/{family_id}/connections", get(list_connections))
        .route("/families/{family_id}/ics-connections", post(create_ics_connection))
        .route("/connections/{connection_id}", delete(disconnect))
        .route("/connections/{connection_id}/pause", post(pause))
        .route("/connections/{connection_id}/resume", post(resume))
        .route("/connections/{connection_id}/sync", post(request_sync))
}

#[derive(Debug, Deserialize)]
pub struct ValidateIcsRequest {
    pub url: String,
}

/// POST /ics/validate
///
/// An unreachable or malformed feed is a normal `200` with `valid: false`.
async fn validate_ics(
    State(context): State<AppState>,
    Json(request): Json<ValidateIcsRequest>,
) -> Result<Json<IcsValidationResult>, ApiError> {
    Ok(Json(context.api.validate_ics_url(&request.url).await?))
}

/// GET /families/{family_id}/connections
async fn list_connections(
    State(context): State<AppState>,
    Path(family_id): Path<Uuid>,
) -> Result<Json<Vec<CalendarConnection>>, ApiError> {
    Ok(Json(context.api.list_connections(family_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIcsRequest {
    pub url: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub assigned_member_ids: Vec<Uuid>,
    #[serde(default)]
    pub sync_settings: Option<SyncSettings>,
}

/// POST /families/{family_id}/ics-connections
async fn create_ics_connection(
    State(context): State<AppState>,
    Path(family_id): Path<Uuid>,
    Json(request): Json<CreateIcsRequest>,
) -> Result<(StatusCode, Json<CalendarConnection>), ApiError> {
    let subscription = IcsSubscription {
        family_id,
        url: request.url,
        display_name: request.display_name,
        color: request.color,
        assigned_member_ids: request.assigned_member_ids,
        sync_settings: request.sync_settings,
    };
    let connection = context.api.create_ics_connection(subscription).await?;
    Ok((StatusCode::CREATED, Json(connection)))
}

/// POST /connections/{connection_id}/pause
async fn pause(
    State(context): State<AppState>,
    Path(connection_id): Path<Uuid>,
) -> Result<Json<CalendarConnection>, ApiError> {
    Ok(Json(context.api.pause_connection(connection_id).await?))
}

/// POST /connections/{connection_id}/resume
async fn resume(
    State(context): State<AppState>,
    Path(connection_id): Path<Uuid>,
) -> Result<Json<CalendarConnection>, ApiError> {
    Ok(Json(context.api.resume_connection(connection_id).await?))
}

/// DELETE /connections/{connection_id}
async fn disconnect(
    State(context): State<AppState>,
    Path(connection_id): Path<Uuid>,
) -> Result<Json<CalendarConnection>, ApiError> {
    Ok(Json(context.api.disconnect_connection(connection_id).await?))
}

/// Body of a manual sync response.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncResponse {
    Completed { outcome: SyncOutcome },
    Skipped { reason: &'static str, connection_status: Option<ConnectionStatus> },
}

impl From<SyncAttempt> for SyncResponse {
    fn from(attempt: SyncAttempt) -> Self {
        match attempt {
            SyncAttempt::Completed(outcome) => Self::Completed { outcome },
            SyncAttempt::Skipped(SkipReason::AlreadyClaimed) => {
                Self::Skipped { reason: "already_claimed", connection_status: None }
            }
            SyncAttempt::Skipped(SkipReason::Disabled) => {
                Self::Skipped { reason: "disabled", connection_status: None }
            }
            SyncAttempt::Skipped(SkipReason::NotSyncable(status)) => {
                Self::Skipped { reason: "not_syncable", connection_status: Some(status) }
            }
        }
    }
}

/// POST /connections/{connection_id}/sync
async fn request_sync(
    State(context): State<AppState>,
    Path(connection_id): Path<Uuid>,
) -> Result<Json<SyncResponse>, ApiError> {
    let attempt = context.api.request_sync(connection_id).await?;
    Ok(Json(SyncResponse::from(attempt)))
}
