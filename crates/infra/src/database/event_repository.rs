//! SQLite implementation of the MirroredEventRepository port.

use async_trait::async_trait;
use chrono::Utc;
use hearthsync_core::{ClaimFence, EventChangeSet, MirroredEventRepository};
use hearthsync_domain::{ConnectionStatus, HearthSyncError, MirroredEvent, Result};
use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::codec::{from_json, from_micros, parse_uuid, to_json, to_micros};
use super::manager::{map_sql_error, DbManager};

const UPSERT_SQL: &str = "INSERT INTO mirrored_events (
        id, connection_id, external_id, title, start_time, end_time, is_all_day,
        location, assignee_ids, color, content_hash, deleted_locally,
        locally_modified, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
    ON CONFLICT(id) DO UPDATE SET
        external_id = excluded.external_id,
        title = excluded.title,
        start_time = excluded.start_time,
        end_time = excluded.end_time,
        is_all_day = excluded.is_all_day,
        location = excluded.location,
        assignee_ids = excluded.assignee_ids,
        color = excluded.color,
        content_hash = excluded.content_hash,
        deleted_locally = excluded.deleted_locally,
        locally_modified = excluded.locally_modified,
        updated_at = excluded.updated_at";

/// SQLite implementation of [`MirroredEventRepository`]
#[derive(Debug, Clone)]
pub struct SqliteMirroredEventRepository {
    db: DbManager,
}

impl SqliteMirroredEventRepository {
    pub fn new(db: DbManager) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MirroredEventRepository for SqliteMirroredEventRepository {
    #[instrument(skip(self))]
    async fn list_for_connection(&self, connection_id: Uuid) -> Result<Vec<MirroredEvent>> {
        self.db
            .run(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, connection_id, external_id, title, start_time, end_time,
                                is_all_day, location, assignee_ids, color, content_hash,
                                deleted_locally, locally_modified, updated_at
                         FROM mirrored_events
                         WHERE connection_id = ?1
                         ORDER BY start_time ASC, id ASC",
                    )
                    .map_err(map_sql_error)?;
                let rows = stmt
                    .query_map(params![connection_id.to_string()], map_row)
                    .map_err(map_sql_error)?;
                let events = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?;
                Ok(events)
            })
            .await
    }

    #[instrument(
        skip(self, changes),
        fields(
            connection_id = %fence.connection_id,
            inserts = changes.inserts.len(),
            updates = changes.updates.len(),
            deletes = changes.deletes.len(),
            tombstones = changes.tombstones.len()
        )
    )]
    async fn apply_changes(&self, fence: ClaimFence, changes: &EventChangeSet) -> Result<()> {
        let changes = changes.clone();
        self.db
            .run(move |conn| {
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(map_sql_error)?;
                check_fence(&tx, fence)?;
                apply_in_transaction(&tx, fence.connection_id, &changes)?;
                tx.commit().map_err(map_sql_error)?;
                debug!("applied reconciliation changes");
                Ok(())
            })
            .await
    }

    #[instrument(skip(self), fields(connection_id = %fence.connection_id))]
    async fn assign_external_id(
        &self,
        fence: ClaimFence,
        event_id: Uuid,
        external_id: &str,
    ) -> Result<()> {
        let external_id = external_id.to_string();
        self.db
            .run(move |conn| {
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(map_sql_error)?;
                check_fence(&tx, fence)?;
                let affected = tx
                    .execute(
                        "UPDATE mirrored_events
                         SET external_id = ?3, locally_modified = 0, deleted_locally = 0,
                             updated_at = ?4
                         WHERE id = ?1 AND connection_id = ?2",
                        params![
                            event_id.to_string(),
                            fence.connection_id.to_string(),
                            external_id,
                            to_micros(Utc::now())
                        ],
                    )
                    .map_err(map_sql_error)?;
                if affected == 0 {
                    return Err(HearthSyncError::NotFound(format!("event {event_id}")));
                }
                tx.commit().map_err(map_sql_error)?;
                Ok(())
            })
            .await
    }

    #[instrument(skip(self))]
    async fn delete_for_connection(&self, connection_id: Uuid) -> Result<u64> {
        self.db
            .run(move |conn| {
                let removed = conn
                    .execute(
                        "DELETE FROM mirrored_events WHERE connection_id = ?1",
                        params![connection_id.to_string()],
                    )
                    .map_err(map_sql_error)?;
                debug!(removed, "deleted mirrored events");
                Ok(u64::try_from(removed).unwrap_or(u64::MAX))
            })
            .await
    }
}

/// Fail with `ConcurrencyConflict` unless the connection is still at the
/// fenced version and not disconnected. Callers hold an immediate
/// transaction, so the answer stays true until they commit.
fn check_fence(tx: &Transaction<'_>, fence: ClaimFence) -> Result<()> {
    let stored: Option<(i64, String)> = tx
        .query_row(
            "SELECT version, status FROM calendar_connections WHERE id = ?1",
            params![fence.connection_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(map_sql_error)?;

    match stored {
        None => Err(HearthSyncError::ConcurrencyConflict(format!(
            "connection {} no longer exists",
            fence.connection_id
        ))),
        Some((_, status)) if status == ConnectionStatus::Disconnected.to_string() => Err(
            HearthSyncError::ConcurrencyConflict(format!("connection {} is disconnected", fence.connection_id)),
        ),
        Some((version, _)) if version != fence.version.0 => {
            Err(HearthSyncError::ConcurrencyConflict(format!(
                "claim {} superseded by v{version}",
                fence.version
            )))
        }
        Some(_) => Ok(()),
    }
}

fn apply_in_transaction(
    tx: &Transaction<'_>,
    connection_id: Uuid,
    changes: &EventChangeSet,
) -> Result<()> {
    let owner = connection_id.to_string();
    {
        let mut upsert = tx.prepare_cached(UPSERT_SQL).map_err(map_sql_error)?;
        for event in changes.inserts.iter().chain(&changes.updates) {
            if event.connection_id != connection_id {
                return Err(HearthSyncError::Validation(format!(
                    "event {} belongs to another connection",
                    event.id
                )));
            }
            let assignees = to_json(&event.assignee_ids).map_err(map_sql_error)?;
            upsert
                .execute(params![
                    event.id.to_string(),
                    owner,
                    event.external_id,
                    event.title,
                    to_micros(event.start_time),
                    to_micros(event.end_time),
                    event.is_all_day,
                    event.location,
                    assignees,
                    event.color,
                    event.content_hash,
                    event.deleted_locally,
                    event.locally_modified,
                    to_micros(event.updated_at),
                ])
                .map_err(map_sql_error)?;
        }
    }

    {
        let mut delete = tx
            .prepare_cached("DELETE FROM mirrored_events WHERE id = ?1 AND connection_id = ?2")
            .map_err(map_sql_error)?;
        for id in &changes.deletes {
            delete.execute(params![id.to_string(), owner]).map_err(map_sql_error)?;
        }
    }

    let mut tombstone = tx
        .prepare_cached(
            "UPDATE mirrored_events SET deleted_locally = 1 WHERE id = ?1 AND connection_id = ?2",
        )
        .map_err(map_sql_error)?;
    for id in &changes.tombstones {
        tombstone.execute(params![id.to_string(), owner]).map_err(map_sql_error)?;
    }
    Ok(())
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<MirroredEvent> {
    Ok(MirroredEvent {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        connection_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
        external_id: row.get(2)?,
        title: row.get(3)?,
        start_time: from_micros(4, row.get(4)?)?,
        end_time: from_micros(5, row.get(5)?)?,
        is_all_day: row.get(6)?,
        location: row.get(7)?,
        assignee_ids: from_json(8, &row.get::<_, String>(8)?)?,
        color: row.get(9)?,
        content_hash: row.get(10)?,
        deleted_locally: row.get(11)?,
        locally_modified: row.get(12)?,
        updated_at: from_micros(13, row.get(13)?)?,
    })
}
