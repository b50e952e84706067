//! SQLite repository behaviour against a real database file.

mod support;

use chrono::Duration;
use hearthsync_core::{
    ClaimFence, ConnectionRepository, CredentialStore, EventChangeSet, MirroredEventRepository,
};
use hearthsync_domain::{CalendarProvider, ConnectionStatus, HearthSyncError, TokenSet};
use hearthsync_infra::database::{
    SqliteConnectionRepository, SqliteCredentialStore, SqliteMirroredEventRepository,
};
use support::{active_connection, fixed_now, mirrored_event, TestDatabase};
use uuid::Uuid;

#[tokio::test]
async fn connection_round_trips_every_column() {
    let db = TestDatabase::new();
    let repo = SqliteConnectionRepository::new(db.manager.clone());
    let now = fixed_now();

    let mut connection = active_connection(Uuid::new_v4(), CalendarProvider::Google, "primary", now);
    connection.assigned_member_ids = vec![Uuid::new_v4(), Uuid::new_v4()];
    connection.color = Some("#3366ff".into());
    connection.sync_settings.two_way_sync = true;
    connection.last_synced_at = Some(now - Duration::minutes(7));
    connection.last_sync_error = Some("rate limited".into());
    connection.consecutive_failures = 2;
    repo.insert(&connection).await.expect("insert");

    let loaded = repo.get(connection.id).await.expect("get").expect("row exists");
    assert_eq!(loaded, connection);
}

#[tokio::test]
async fn stale_versions_are_rejected() {
    let db = TestDatabase::new();
    let repo = SqliteConnectionRepository::new(db.manager.clone());
    let connection =
        active_connection(Uuid::new_v4(), CalendarProvider::Google, "primary", fixed_now());
    repo.insert(&connection).await.expect("insert");

    let mut first = connection.clone();
    first.display_name = "Kids".into();
    let saved = repo.update(&first).await.expect("first writer wins");
    assert_eq!(saved.version, connection.version.next());

    let mut second = connection.clone();
    second.status = ConnectionStatus::Paused;
    let err = repo.update(&second).await.expect_err("stale writer loses");
    assert!(matches!(err, HearthSyncError::ConcurrencyConflict(_)));

    let stored = repo.get(connection.id).await.unwrap().unwrap();
    assert_eq!(stored.display_name, "Kids");
    assert_eq!(stored.status, ConnectionStatus::Active);
    assert_eq!(stored.version, saved.version);
}

#[tokio::test]
async fn updating_a_missing_connection_is_not_found() {
    let db = TestDatabase::new();
    let repo = SqliteConnectionRepository::new(db.manager.clone());
    let connection =
        active_connection(Uuid::new_v4(), CalendarProvider::Google, "primary", fixed_now());

    let err = repo.update(&connection).await.expect_err("nothing to update");
    assert!(matches!(err, HearthSyncError::NotFound(_)));
}

#[tokio::test]
async fn live_key_is_unique_until_disconnected() {
    let db = TestDatabase::new();
    let repo = SqliteConnectionRepository::new(db.manager.clone());
    let family = Uuid::new_v4();
    let now = fixed_now();

    let original = active_connection(family, CalendarProvider::Google, "primary", now);
    repo.insert(&original).await.expect("insert");

    let duplicate = active_connection(family, CalendarProvider::Google, "primary", now);
    let err = repo.insert(&duplicate).await.expect_err("live key taken");
    assert!(matches!(err, HearthSyncError::ConcurrencyConflict(_)));

    let other_calendar = active_connection(family, CalendarProvider::Google, "school", now);
    repo.insert(&other_calendar).await.expect("different calendar is a different key");

    let found = repo.find_live_by_key(&original.key()).await.unwrap().expect("live row");
    assert_eq!(found.id, original.id);

    let mut disconnected = original.clone();
    disconnected.status = ConnectionStatus::Disconnected;
    repo.update(&disconnected).await.expect("disconnect");
    assert!(repo.find_live_by_key(&original.key()).await.unwrap().is_none());

    repo.insert(&duplicate).await.expect("key is free again after disconnect");
    assert_eq!(repo.list_for_family(family).await.unwrap().len(), 3);
}

#[tokio::test]
async fn find_due_orders_by_next_sync_and_respects_limit() {
    let db = TestDatabase::new();
    let repo = SqliteConnectionRepository::new(db.manager.clone());
    let family = Uuid::new_v4();
    let now = fixed_now();

    let mut later = active_connection(family, CalendarProvider::Google, "a", now);
    later.next_sync_at = now - Duration::minutes(1);
    let mut earliest = active_connection(family, CalendarProvider::Google, "b", now);
    earliest.next_sync_at = now - Duration::minutes(30);
    let mut errored = active_connection(family, CalendarProvider::Google, "c", now);
    errored.status = ConnectionStatus::SyncError;
    errored.next_sync_at = now - Duration::minutes(10);
    let mut future = active_connection(family, CalendarProvider::Google, "d", now);
    future.next_sync_at = now + Duration::minutes(5);
    let mut paused = active_connection(family, CalendarProvider::Google, "e", now);
    paused.status = ConnectionStatus::Paused;
    let mut pending = active_connection(family, CalendarProvider::Google, "f", now);
    pending.status = ConnectionStatus::PendingAuth;
    pending.next_sync_at = now - Duration::minutes(20);
    let mut disabled = active_connection(family, CalendarProvider::Google, "g", now);
    disabled.is_enabled = false;

    for connection in [&later, &earliest, &errored, &future, &paused, &pending, &disabled] {
        repo.insert(connection).await.expect("insert");
    }

    let due = repo.find_due(now, 10).await.expect("find_due");
    let ids: Vec<_> = due.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![earliest.id, pending.id, errored.id, later.id]);

    let limited = repo.find_due(now, 2).await.expect("find_due");
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].id, earliest.id);
}

#[tokio::test]
async fn apply_changes_is_scoped_to_the_connection() {
    let db = TestDatabase::new();
    let connections = SqliteConnectionRepository::new(db.manager.clone());
    let events = SqliteMirroredEventRepository::new(db.manager.clone());
    let now = fixed_now();
    let connection =
        active_connection(Uuid::new_v4(), CalendarProvider::Google, "primary", now);
    connections.insert(&connection).await.expect("insert connection");

    let keep = mirrored_event(connection.id, "keep", 2, now);
    let change = mirrored_event(connection.id, "change", 1, now);
    let drop = mirrored_event(connection.id, "drop", 3, now);
    let tombstone = mirrored_event(connection.id, "tomb", 4, now);
    events
        .apply_changes(
            ClaimFence::of(&connection),
            &EventChangeSet {
                inserts: vec![keep.clone(), change.clone(), drop.clone(), tombstone.clone()],
                ..EventChangeSet::default()
            },
        )
        .await
        .expect("initial insert");

    let mut changed = change.clone();
    changed.title = "Moved dentist".into();
    events
        .apply_changes(
            ClaimFence::of(&connection),
            &EventChangeSet {
                updates: vec![changed.clone()],
                deletes: vec![drop.id],
                tombstones: vec![tombstone.id],
                ..EventChangeSet::default()
            },
        )
        .await
        .expect("second pass");

    let stored = events.list_for_connection(connection.id).await.expect("list");
    let titles: Vec<_> = stored.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Moved dentist", "Event keep", "Event tomb"]);
    assert_eq!(stored[0].assignee_ids, change.assignee_ids);
    assert!(stored[2].deleted_locally);

    let foreign = mirrored_event(Uuid::new_v4(), "foreign", 1, now);
    let err = events
        .apply_changes(
            ClaimFence::of(&connection),
            &EventChangeSet { inserts: vec![foreign], ..EventChangeSet::default() },
        )
        .await
        .expect_err("rows must belong to the connection");
    assert!(matches!(err, HearthSyncError::Validation(_)));
    assert_eq!(events.list_for_connection(connection.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn assign_external_id_clears_the_local_edit_flag() {
    let db = TestDatabase::new();
    let connections = SqliteConnectionRepository::new(db.manager.clone());
    let events = SqliteMirroredEventRepository::new(db.manager.clone());
    let now = fixed_now();
    let connection =
        active_connection(Uuid::new_v4(), CalendarProvider::Google, "primary", now);
    connections.insert(&connection).await.unwrap();

    let mut local = mirrored_event(connection.id, "unused", 1, now);
    local.external_id = None;
    local.locally_modified = true;
    events
        .apply_changes(
            ClaimFence::of(&connection),
            &EventChangeSet { inserts: vec![local.clone()], ..EventChangeSet::default() },
        )
        .await
        .unwrap();

    let fence = ClaimFence::of(&connection);
    events.assign_external_id(fence, local.id, "remote-42").await.expect("assign");
    let stored = events.list_for_connection(connection.id).await.unwrap();
    assert_eq!(stored[0].external_id.as_deref(), Some("remote-42"));
    assert!(!stored[0].locally_modified);

    let err = events.assign_external_id(fence, Uuid::new_v4(), "x").await.expect_err("unknown row");
    assert!(matches!(err, HearthSyncError::NotFound(_)));

    assert_eq!(events.delete_for_connection(connection.id).await.unwrap(), 1);
    assert!(events.list_for_connection(connection.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn mirror_writes_need_the_current_claim() {
    let db = TestDatabase::new();
    let connections = SqliteConnectionRepository::new(db.manager.clone());
    let events = SqliteMirroredEventRepository::new(db.manager.clone());
    let now = fixed_now();
    let connection =
        active_connection(Uuid::new_v4(), CalendarProvider::Google, "primary", now);
    connections.insert(&connection).await.unwrap();

    let mut claimed = connection.clone();
    claimed.next_sync_at = now + Duration::minutes(15);
    let claimed = connections.update(&claimed).await.expect("claim");
    let stale = ClaimFence::of(&connection);
    let current = ClaimFence::of(&claimed);

    let row = mirrored_event(connection.id, "a", 1, now);
    let batch = EventChangeSet { inserts: vec![row.clone()], ..EventChangeSet::default() };
    let err = events.apply_changes(stale, &batch).await.expect_err("superseded claim");
    assert!(matches!(err, HearthSyncError::ConcurrencyConflict(_)));
    assert!(events.list_for_connection(connection.id).await.unwrap().is_empty());

    events.apply_changes(current, &batch).await.expect("current claim");
    let err = events.assign_external_id(stale, row.id, "b").await.expect_err("superseded claim");
    assert!(matches!(err, HearthSyncError::ConcurrencyConflict(_)));

    let mut disconnected = claimed.clone();
    disconnected.status = ConnectionStatus::Disconnected;
    let disconnected = connections.update(&disconnected).await.expect("disconnect");
    events.delete_for_connection(connection.id).await.unwrap();
    let err = events
        .apply_changes(ClaimFence::of(&disconnected), &batch)
        .await
        .expect_err("disconnected connections take no mirrors");
    assert!(matches!(err, HearthSyncError::ConcurrencyConflict(_)));
    assert!(events.list_for_connection(connection.id).await.unwrap().is_empty());

    let missing = ClaimFence { connection_id: Uuid::new_v4(), version: claimed.version };
    let err = events.apply_changes(missing, &EventChangeSet::default()).await.expect_err("no row");
    assert!(matches!(err, HearthSyncError::ConcurrencyConflict(_)));
}

#[tokio::test]
async fn assign_external_id_revives_a_tombstone() {
    let db = TestDatabase::new();
    let connections = SqliteConnectionRepository::new(db.manager.clone());
    let events = SqliteMirroredEventRepository::new(db.manager.clone());
    let now = fixed_now();
    let connection =
        active_connection(Uuid::new_v4(), CalendarProvider::Google, "primary", now);
    connections.insert(&connection).await.unwrap();
    let fence = ClaimFence::of(&connection);

    let mut tombstone = mirrored_event(connection.id, "gone", 1, now);
    tombstone.locally_modified = true;
    tombstone.deleted_locally = true;
    let batch = EventChangeSet { inserts: vec![tombstone.clone()], ..EventChangeSet::default() };
    events.apply_changes(fence, &batch).await.unwrap();

    events.assign_external_id(fence, tombstone.id, "recreated-1").await.expect("assign");
    let stored = events.list_for_connection(connection.id).await.unwrap();
    assert_eq!(stored[0].external_id.as_deref(), Some("recreated-1"));
    assert!(!stored[0].deleted_locally);
    assert!(!stored[0].locally_modified);
}

#[tokio::test]
async fn credentials_are_replaced_and_deleted() {
    let db = TestDatabase::new();
    let connections = SqliteConnectionRepository::new(db.manager.clone());
    let credentials = SqliteCredentialStore::new(db.manager.clone());
    let now = fixed_now();
    let connection =
        active_connection(Uuid::new_v4(), CalendarProvider::Google, "primary", now);
    connections.insert(&connection).await.unwrap();

    assert!(credentials.get(connection.id).await.unwrap().is_none());

    let mut first = TokenSet::bearer("access-1");
    first.refresh_token = Some("refresh-1".into());
    first.expires_at = Some(now + Duration::hours(1));
    credentials.put(connection.id, &first).await.expect("put");
    assert_eq!(credentials.get(connection.id).await.unwrap(), Some(first));

    let second = TokenSet::bearer("access-2");
    credentials.put(connection.id, &second).await.expect("overwrite");
    assert_eq!(credentials.get(connection.id).await.unwrap(), Some(second));

    credentials.delete(connection.id).await.expect("delete");
    assert!(credentials.get(connection.id).await.unwrap().is_none());
}
