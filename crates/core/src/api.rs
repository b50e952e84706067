//! Engine entry points used by the HTTP front door
//!
//! Each method builds an [`OperationContext`] with its input checks and runs
//! the underlying service call through the [`OperationPipeline`].

use std::sync::Arc;

use hearthsync_domain::{
    CalendarConnection, CalendarProvider, CalendarSelection, IcsValidationResult, OAuthSession,
    Result,
};
use uuid::Uuid;

use crate::connections::{ConnectionLifecycleService, IcsSubscription};
use crate::ics::IcsValidator;
use crate::oauth::{InitiatedSession, OAuthSessionService};
use crate::pipeline::{OperationContext, OperationPipeline};
use crate::sync::SyncAttempt;

pub struct CalendarConnectionsApi {
    oauth: Arc<OAuthSessionService>,
    lifecycle: Arc<ConnectionLifecycleService>,
    ics: Arc<IcsValidator>,
    pipeline: OperationPipeline,
}

impl CalendarConnectionsApi {
    pub fn new(
        oauth: Arc<OAuthSessionService>,
        lifecycle: Arc<ConnectionLifecycleService>,
        ics: Arc<IcsValidator>,
        pipeline: OperationPipeline,
    ) -> Self {
        Self { oauth, lifecycle, ics, pipeline }
    }

    pub async fn initiate_oauth(
        &self,
        family_id: Uuid,
        provider: CalendarProvider,
        redirect_uri: &str,
    ) -> Result<InitiatedSession> {
        let ctx = OperationContext::new("oauth::initiate")
            .field("provider", provider)
            .require(!family_id.is_nil(), "family id is required")
            .require(!redirect_uri.trim().is_empty(), "redirect URI is required");
        self.pipeline
            .run(ctx, || self.oauth.initiate_session(family_id, provider, redirect_uri))
            .await
    }

    pub async fn complete_oauth_session(
        &self,
        code: &str,
        state: &str,
        redirect_uri: &str,
    ) -> Result<OAuthSession> {
        let ctx = OperationContext::new("oauth::complete")
            .require(!code.is_empty(), "authorization code is required")
            .require(!state.is_empty(), "state is required")
            .require(!redirect_uri.trim().is_empty(), "redirect URI is required");
        self.pipeline.run(ctx, || self.oauth.complete_by_state(code, state, redirect_uri)).await
    }

    pub async fn start_credential_session(
        &self,
        family_id: Uuid,
        provider: CalendarProvider,
        username: &str,
        secret: &str,
    ) -> Result<OAuthSession> {
        let ctx = OperationContext::new("oauth::start_credential_session")
            .field("provider", provider)
            .require(!family_id.is_nil(), "family id is required");
        self.pipeline
            .run(ctx, || self.oauth.start_credential_session(family_id, provider, username, secret))
            .await
    }

    pub async fn create_connections_from_session(
        &self,
        session_id: Uuid,
        selections: &[CalendarSelection],
    ) -> Result<Vec<CalendarConnection>> {
        let ctx = OperationContext::new("oauth::materialize")
            .field("session_id", session_id)
            .field("selections", selections.len())
            .require(
                selections.iter().all(|s| !s.external_calendar_id.trim().is_empty()),
                "every selection needs a calendar id",
            );
        self.pipeline
            .run(ctx, || self.oauth.materialize_connections(session_id, selections))
            .await
    }

    pub async fn validate_ics_url(&self, url: &str) -> Result<IcsValidationResult> {
        let ctx = OperationContext::new("ics::validate")
            .require(!url.trim().is_empty(), "URL is required");
        self.pipeline.run(ctx, || async { Ok(self.ics.validate(url).await) }).await
    }

    pub async fn create_ics_connection(
        &self,
        subscription: IcsSubscription,
    ) -> Result<CalendarConnection> {
        let ctx = OperationContext::new("ics::create_connection")
            .require(!subscription.family_id.is_nil(), "family id is required")
            .require(!subscription.url.trim().is_empty(), "URL is required");
        self.pipeline.run(ctx, || self.lifecycle.create_ics_connection(subscription)).await
    }

    pub async fn pause_connection(&self, connection_id: Uuid) -> Result<CalendarConnection> {
        let ctx = OperationContext::new("connections::pause").field("connection_id", connection_id);
        self.pipeline.run(ctx, || self.lifecycle.pause(connection_id)).await
    }

    pub async fn resume_connection(&self, connection_id: Uuid) -> Result<CalendarConnection> {
        let ctx = OperationContext::new("connections::resume").field("connection_id", connection_id);
        self.pipeline.run(ctx, || self.lifecycle.resume(connection_id)).await
    }

    pub async fn disconnect_connection(&self, connection_id: Uuid) -> Result<CalendarConnection> {
        let ctx =
            OperationContext::new("connections::disconnect").field("connection_id", connection_id);
        self.pipeline.run(ctx, || self.lifecycle.disconnect(connection_id)).await
    }

    pub async fn request_sync(&self, connection_id: Uuid) -> Result<SyncAttempt> {
        let ctx = OperationContext::new("connections::request_sync")
            .field("connection_id", connection_id);
        self.pipeline.run(ctx, || self.lifecycle.request_sync(connection_id)).await
    }

    pub async fn list_connections(&self, family_id: Uuid) -> Result<Vec<CalendarConnection>> {
        let ctx = OperationContext::new("connections::list")
            .require(!family_id.is_nil(), "family id is required");
        self.pipeline.run(ctx, || self.lifecycle.list_for_family(family_id)).await
    }
}
