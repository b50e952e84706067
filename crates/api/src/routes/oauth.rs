//! OAuth and credential session endpoints

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use hearthsync_core::InitiatedSession;
use hearthsync_domain::{CalendarConnection, CalendarProvider, CalendarSelection, OAuthSession};
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiError, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/oauth/sessions", post(initiate))
        .route("/oauth/sessions/complete", post(complete))
        .route("/oauth/sessions/{session_id}/connections", post(materialize))
        .route("/credential-sessions", post(credential_session))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    pub family_id: Uuid,
    pub provider: CalendarProvider,
    pub redirect_uri: String,
}

/// POST /oauth/sessions
async fn initiate(
    State(context): State<AppState>,
    Json(request): Json<InitiateRequest>,
) -> Result<(StatusCode, Json<InitiatedSession>), ApiError> {
    let session = context
        .api
        .initiate_oauth(request.family_id, request.provider, &request.redirect_uri)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub code: String,
    pub state: String,
    pub redirect_uri: String,
}

/// POST /oauth/sessions/complete
async fn complete(
    State(context): State<AppState>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<OAuthSession>, ApiError> {
    let session = context
        .api
        .complete_oauth_session(&request.code, &request.state, &request.redirect_uri)
        .await?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializeRequest {
    pub selections: Vec<CalendarSelection>,
}

/// POST /oauth/sessions/{session_id}/connections
async fn materialize(
    State(context): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<MaterializeRequest>,
) -> Result<(StatusCode, Json<Vec<CalendarConnection>>), ApiError> {
    let connections =
        context.api.create_connections_from_session(session_id, &request.selections).await?;
    Ok((StatusCode::CREATED, Json(connections)))
}

/// App-specific passwords are never echoed back or logged.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSessionRequest {
    pub family_id: Uuid,
    pub provider: CalendarProvider,
    pub username: String,
    pub password: String,
}

/// POST /credential-sessions
async fn credential_session(
    State(context): State<AppState>,
    Json(request): Json<CredentialSessionRequest>,
) -> Result<(StatusCode, Json<OAuthSession>), ApiError> {
    let session = context
        .api
        .start_credential_session(
            request.family_id,
            request.provider,
            &request.username,
            &request.password,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}
