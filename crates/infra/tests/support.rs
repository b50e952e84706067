//! Shared helpers for `hearthsync-infra` integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use hearthsync_core::sync::content_hash;
use hearthsync_domain::{CalendarConnection, CalendarProvider, ConnectionStatus, MirroredEvent};
use hearthsync_infra::database::DbManager;
use tempfile::TempDir;
use uuid::Uuid;

/// Temporary database wrapper that keeps the underlying file alive for the
/// duration of a test run.
pub struct TestDatabase {
    pub manager: DbManager,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a new temporary database with the full schema.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_path = temp_dir.path().join("hearthsync-test.db");

        let manager = DbManager::new(&db_path, 4).expect("db manager should be created");
        manager.run_migrations().expect("schema should be created");

        Self { manager, _temp_dir: temp_dir }
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).single().expect("valid timestamp")
}

/// Active connection that is due at `now`.
pub fn active_connection(
    family_id: Uuid,
    provider: CalendarProvider,
    calendar_id: &str,
    now: DateTime<Utc>,
) -> CalendarConnection {
    let mut connection =
        CalendarConnection::new(family_id, provider, "parent@example.com", calendar_id, "Family", now);
    connection.status = ConnectionStatus::Active;
    connection
}

/// Mirror row for `external_id`, starting `offset_days` after `now`.
pub fn mirrored_event(
    connection_id: Uuid,
    external_id: &str,
    offset_days: i64,
    now: DateTime<Utc>,
) -> MirroredEvent {
    let start_time = now + Duration::days(offset_days);
    let mut event = MirroredEvent {
        id: Uuid::now_v7(),
        connection_id,
        external_id: Some(external_id.to_string()),
        title: format!("Event {external_id}"),
        start_time,
        end_time: start_time + Duration::hours(1),
        is_all_day: false,
        location: Some("Kitchen".into()),
        assignee_ids: vec![Uuid::new_v4()],
        color: None,
        content_hash: String::new(),
        deleted_locally: false,
        locally_modified: false,
        updated_at: now,
    };
    event.content_hash = content_hash(event.content());
    event
}
