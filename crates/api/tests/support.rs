#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use hearthsync_app::{router, AppContext};
use hearthsync_domain::Config;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// Full application over a throwaway SQLite file, scheduler off.
pub struct TestApp {
    pub context: Arc<AppContext>,
    pub router: Router,
    _temp_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let mut config = Config::default();
        config.database.path =
            temp_dir.path().join("hearthsync-test.db").to_string_lossy().into_owned();
        config.database.pool_size = 4;
        config.scheduler.enabled = false;
        config.scheduler.provider_timeout_secs = 5;
        customize(&mut config);

        let context = Arc::new(AppContext::new(config).expect("context should build"));
        let router = router(Arc::clone(&context));
        Self { context, router, _temp_dir: temp_dir }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request should build");

        let response = self.router.clone().oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("body should be JSON")
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn post_empty(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::POST, uri, None).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, None).await
    }

    /// Poll a family's connection list until `connection_id` reaches `status`.
    pub async fn wait_for_status(&self, family_id: &str, connection_id: &str, status: &str) -> Value {
        let uri = format!("/api/v1/families/{family_id}/connections");
        for _ in 0..100 {
            let (_, body) = self.get(&uri).await;
            if let Some(found) = body
                .as_array()
                .and_then(|list| list.iter().find(|c| c["id"] == connection_id))
            {
                if found["status"] == status {
                    return found.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("connection {connection_id} never reached status {status}");
    }
}

pub fn ics_feed(name: &str) -> String {
    let start = chrono::Utc::now() + chrono::Duration::days(3);
    let end = start + chrono::Duration::hours(2);
    let fmt = "%Y%m%dT%H%M%SZ";
    format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//School//EN\r\nX-WR-CALNAME:{name}\r\n\
BEGIN:VEVENT\r\nUID:parents-evening\r\nDTSTAMP:{start}\r\nDTSTART:{start}\r\nDTEND:{end}\r\n\
SUMMARY:Parents evening\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
        start = start.format(fmt),
        end = end.format(fmt),
    )
}
