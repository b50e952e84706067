//! HTTP front door exercised end to end through `oneshot`.

mod support;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use hearthsync_domain::OAuthClientConfig;
use serde_json::json;
use support::{ics_feed, TestApp};
use tower::ServiceExt;
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn feed_server(name: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/school.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ics_feed(name)))
        .mount(&server)
        .await;
    server
}

#[tokio::test(flavor = "multi_thread")]
async fn health_reports_database_and_scheduler() {
    let app = TestApp::new();
    let (status, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["schedulerRunning"], false);
    assert_eq!(body["metrics"]["runs"], 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn ics_validation_never_fails_the_request() {
    let server = feed_server("Riverside Primary").await;
    let app = TestApp::new();

    let (status, body) = app
        .post("/api/v1/ics/validate", json!({ "url": format!("{}/school.ics", server.uri()) }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["calendarName"], "Riverside Primary");

    let (status, body) =
        app.post("/api/v1/ics/validate", json!({ "url": "ftp://example.com/feed.ics" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);

    let (status, body) = app.post("/api/v1/ics/validate", json!({ "url": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
}

#[tokio::test(flavor = "multi_thread")]
async fn ics_connection_lifecycle() {
    let server = feed_server("Riverside Primary").await;
    let app = TestApp::new();
    let family_id = Uuid::new_v4().to_string();

    let (status, created) = app
        .post(
            &format!("/api/v1/families/{family_id}/ics-connections"),
            json!({ "url": format!("{}/school.ics", server.uri()), "color": "#FF9500" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["provider"], "ics_url");
    assert_eq!(created["displayName"], "Riverside Primary");
    assert_eq!(created["isReadOnly"], true);
    let connection_id = created["id"].as_str().expect("id").to_string();

    // The initial sync runs in the background after creation.
    let active = app.wait_for_status(&family_id, &connection_id, "active").await;
    assert!(active["lastSyncedAt"].is_string());

    let (status, synced) =
        app.post_empty(&format!("/api/v1/connections/{connection_id}/sync")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(synced["status"], "completed");
    assert_eq!(synced["outcome"]["success"], true);
    assert_eq!(synced["outcome"]["eventsAdded"], 0);

    let (status, paused) =
        app.post_empty(&format!("/api/v1/connections/{connection_id}/pause")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paused["status"], "paused");

    let (status, body) =
        app.post_empty(&format!("/api/v1/connections/{connection_id}/sync")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, resumed) =
        app.post_empty(&format!("/api/v1/connections/{connection_id}/resume")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resumed["status"], "active");

    let (status, gone) = app.delete(&format!("/api/v1/connections/{connection_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(gone["status"], "disconnected");
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_feed_is_rejected_for_the_same_family() {
    let server = feed_server("Club").await;
    let app = TestApp::new();
    let family_id = Uuid::new_v4();
    let uri = format!("/api/v1/families/{family_id}/ics-connections");
    let body = json!({ "url": format!("{}/school.ics", server.uri()) });

    let (first, _) = app.post(&uri, body.clone()).await;
    let (second, error) = app.post(&uri, body).await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::BAD_REQUEST);
    assert!(error["message"].as_str().unwrap().contains("already connected"));
}

#[tokio::test(flavor = "multi_thread")]
async fn ics_subscription_takes_bounded_sync_settings() {
    let server = feed_server("Swim Club").await;
    let app = TestApp::new();
    let family_id = Uuid::new_v4();
    let uri = format!("/api/v1/families/{family_id}/ics-connections");
    let url = format!("{}/school.ics", server.uri());

    let (status, body) = app
        .post(&uri, json!({ "url": url, "syncSettings": { "syncPastDays": 4_000_000_000u64 } }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("syncPastDays"));

    let (status, created) = app
        .post(
            &uri,
            json!({
                "url": url,
                "syncSettings": { "syncIntervalMinutes": 60, "importAllDayEvents": false, "twoWaySync": true }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["syncSettings"]["syncIntervalMinutes"], 60);
    assert_eq!(created["syncSettings"]["importAllDayEvents"], false);
    assert_eq!(created["syncSettings"]["twoWaySync"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_connection_is_not_found() {
    let app = TestApp::new();
    let (status, body) =
        app.post_empty(&format!("/api/v1/connections/{}/pause", Uuid::new_v4())).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test(flavor = "multi_thread")]
async fn oauth_requires_a_configured_provider() {
    let app = TestApp::new();
    let (status, body) = app
        .post(
            "/api/v1/oauth/sessions",
            json!({
                "familyId": Uuid::new_v4(),
                "provider": "google",
                "redirectUri": "https://app.example/callback"
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("no adapter registered"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_state_and_session_are_rejected() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/api/v1/oauth/sessions/complete",
            json!({ "code": "c", "state": "never-issued", "redirectUri": "https://app.example/cb" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "state_mismatch");

    let (status, body) = app
        .post(
            &format!("/api/v1/oauth/sessions/{}/connections", Uuid::new_v4()),
            json!({ "selections": [{ "externalCalendarId": "primary" }] }),
        )
        .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"], "invalid_session");
}

#[tokio::test(flavor = "multi_thread")]
async fn credential_sessions_need_a_password() {
    let app = TestApp::new();
    let (status, body) = app
        .post(
            "/api/v1/credential-sessions",
            json!({
                "familyId": Uuid::new_v4(),
                "provider": "icloud",
                "username": "parent@icloud.com",
                "password": ""
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
}

#[tokio::test(flavor = "multi_thread")]
async fn google_oauth_flow_creates_connections_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.token",
            "refresh_token": "1//refresh",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/users/me/calendarList/primary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "parent@example.com",
            "summary": "parent@example.com"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/users/me/calendarList"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": "parent@example.com", "summary": "Family", "backgroundColor": "#16a765" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/calendars/parent@example.com/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .mount(&server)
        .await;

    let uri = server.uri();
    let app = TestApp::with_config(|config| {
        config.oauth.google = Some(OAuthClientConfig {
            client_id: "client-id".into(),
            client_secret: Some("client-secret".into()),
            auth_endpoint: Some(format!("{uri}/authorize")),
            token_endpoint: Some(format!("{uri}/token")),
            api_base_url: Some(format!("{uri}/calendar/v3")),
        });
    });
    let family_id = Uuid::new_v4();
    let redirect_uri = "https://app.example/oauth/callback";

    let (status, initiated) = app
        .post(
            "/api/v1/oauth/sessions",
            json!({ "familyId": family_id, "provider": "google", "redirectUri": redirect_uri }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let session_id = initiated["sessionId"].as_str().unwrap().to_string();
    let authorization_url = Url::parse(initiated["authorizationUrl"].as_str().unwrap()).unwrap();
    let state = authorization_url
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .expect("state parameter");

    let complete = json!({ "code": "auth-code", "state": state, "redirectUri": redirect_uri });
    let (status, completed) = app.post("/api/v1/oauth/sessions/complete", complete.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["phase"], "completed");
    assert_eq!(completed["discoveredCalendars"][0]["displayName"], "Family");
    assert!(completed.get("codeVerifier").is_none());

    let (status, body) = app.post("/api/v1/oauth/sessions/complete", complete).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "session_already_consumed");

    let selections = json!({ "selections": [{
        "externalCalendarId": "parent@example.com",
        "syncSettings": { "twoWaySync": true, "syncFutureDays": 14 }
    }] });
    let materialize_uri = format!("/api/v1/oauth/sessions/{session_id}/connections");
    let (status, connections) = app.post(&materialize_uri, selections.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(connections.as_array().unwrap().len(), 1);
    assert_eq!(connections[0]["provider"], "google");
    assert_eq!(connections[0]["color"], "#16a765");
    assert_eq!(connections[0]["syncSettings"]["twoWaySync"], true);
    assert_eq!(connections[0]["syncSettings"]["syncFutureDays"], 14);
    assert_eq!(connections[0]["syncSettings"]["syncPastDays"], 30);

    let (status, body) = app.post(&materialize_uri, selections).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"], "invalid_session");
}

#[tokio::test(flavor = "multi_thread")]
async fn change_stream_is_server_sent_events() {
    let app = TestApp::new();
    let family_id = Uuid::new_v4();

    let request = Request::builder()
        .uri(format!("/api/v1/families/{family_id}/events"))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(app.context.notifications.subscriber_count(family_id), 1);
}
