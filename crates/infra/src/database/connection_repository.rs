//! SQLite implementation of the ConnectionRepository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearthsync_common::redact_identifier;
use hearthsync_core::ConnectionRepository;
use hearthsync_domain::{
    CalendarConnection, ConnectionKey, ConnectionStatus, HearthSyncError, Result, Version,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::codec::{from_json, from_micros, parse_text, parse_uuid, to_json, to_micros};
use super::manager::{map_sql_error, DbManager};

const SELECT_COLUMNS: &str = "SELECT id, family_id, provider, external_account_id,
        external_calendar_id, display_name, status, assigned_member_ids, color,
        is_enabled, is_read_only, sync_settings, last_synced_at, next_sync_at,
        last_sync_error, consecutive_failures, created_at, updated_at, version
     FROM calendar_connections";

/// SQLite implementation of [`ConnectionRepository`].
///
/// Updates are `UPDATE ... WHERE id = ? AND version = ?`; zero affected rows
/// means another writer got there first.
#[derive(Debug, Clone)]
pub struct SqliteConnectionRepository {
    db: DbManager,
}

impl SqliteConnectionRepository {
    pub fn new(db: DbManager) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConnectionRepository for SqliteConnectionRepository {
    #[instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<CalendarConnection>> {
        self.db.run(move |conn| load(conn, id)).await
    }

    #[instrument(skip(self, connection), fields(connection_id = %connection.id, provider = %connection.provider))]
    async fn insert(&self, connection: &CalendarConnection) -> Result<()> {
        let connection = connection.clone();
        self.db
            .run(move |conn| {
                let members = to_json(&connection.assigned_member_ids).map_err(map_sql_error)?;
                let settings = to_json(&connection.sync_settings).map_err(map_sql_error)?;
                conn.execute(
                    "INSERT INTO calendar_connections (
                        id, family_id, provider, external_account_id, external_calendar_id,
                        display_name, status, assigned_member_ids, color, is_enabled,
                        is_read_only, sync_settings, last_synced_at, next_sync_at,
                        last_sync_error, consecutive_failures, created_at, updated_at, version
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                    params![
                        connection.id.to_string(),
                        connection.family_id.to_string(),
                        connection.provider.to_string(),
                        connection.external_account_id,
                        connection.external_calendar_id,
                        connection.display_name,
                        connection.status.to_string(),
                        members,
                        connection.color,
                        connection.is_enabled,
                        connection.is_read_only,
                        settings,
                        connection.last_synced_at.map(to_micros),
                        to_micros(connection.next_sync_at),
                        connection.last_sync_error,
                        connection.consecutive_failures,
                        to_micros(connection.created_at),
                        to_micros(connection.updated_at),
                        connection.version.0,
                    ],
                )
                .map_err(map_sql_error)?;
                debug!("inserted connection");
                Ok(())
            })
            .await
    }

    #[instrument(skip(self, connection), fields(connection_id = %connection.id, version = %connection.version))]
    async fn update(&self, connection: &CalendarConnection) -> Result<CalendarConnection> {
        let connection = connection.clone();
        self.db
            .run(move |conn| {
                let members = to_json(&connection.assigned_member_ids).map_err(map_sql_error)?;
                let settings = to_json(&connection.sync_settings).map_err(map_sql_error)?;
                let affected = conn
                    .execute(
                        "UPDATE calendar_connections SET
                            display_name = ?3, status = ?4, assigned_member_ids = ?5,
                            color = ?6, is_enabled = ?7, is_read_only = ?8,
                            sync_settings = ?9, last_synced_at = ?10, next_sync_at = ?11,
                            last_sync_error = ?12, consecutive_failures = ?13,
                            updated_at = ?14, version = version + 1
                         WHERE id = ?1 AND version = ?2",
                        params![
                            connection.id.to_string(),
                            connection.version.0,
                            connection.display_name,
                            connection.status.to_string(),
                            members,
                            connection.color,
                            connection.is_enabled,
                            connection.is_read_only,
                            settings,
                            connection.last_synced_at.map(to_micros),
                            to_micros(connection.next_sync_at),
                            connection.last_sync_error,
                            connection.consecutive_failures,
                            to_micros(connection.updated_at),
                        ],
                    )
                    .map_err(map_sql_error)?;

                if affected == 0 {
                    return match load(conn, connection.id)? {
                        Some(current) => Err(HearthSyncError::ConcurrencyConflict(format!(
                            "connection {} is at {}, expected {}",
                            connection.id, current.version, connection.version
                        ))),
                        None => Err(HearthSyncError::NotFound(format!(
                            "connection {}",
                            connection.id
                        ))),
                    };
                }

                Ok(CalendarConnection { version: connection.version.next(), ..connection })
            })
            .await
    }

    #[instrument(skip(self))]
    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<CalendarConnection>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let statuses = ConnectionStatus::SCHEDULABLE.map(|s| s.to_string());
        self.db
            .run(move |conn| {
                let sql = format!(
                    "{SELECT_COLUMNS}
                     WHERE is_enabled = 1 AND status IN (?1, ?2, ?3) AND next_sync_at <= ?4
                     ORDER BY next_sync_at ASC, id ASC
                     LIMIT ?5"
                );
                let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
                let rows = stmt
                    .query_map(
                        params![statuses[0], statuses[1], statuses[2], to_micros(now), limit],
                        map_row,
                    )
                    .map_err(map_sql_error)?;
                let due = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?;
                debug!(due = due.len(), "selected due connections");
                Ok(due)
            })
            .await
    }

    #[instrument(skip(self, key), fields(family = %redact_identifier(&key.family_id.to_string()), provider = %key.provider))]
    async fn find_live_by_key(&self, key: &ConnectionKey) -> Result<Option<CalendarConnection>> {
        let key = key.clone();
        self.db
            .run(move |conn| {
                let sql = format!(
                    "{SELECT_COLUMNS}
                     WHERE family_id = ?1 AND provider = ?2 AND external_account_id = ?3
                       AND external_calendar_id = ?4 AND status <> ?5"
                );
                conn.query_row(
                    &sql,
                    params![
                        key.family_id.to_string(),
                        key.provider.to_string(),
                        key.external_account_id,
                        key.external_calendar_id,
                        ConnectionStatus::Disconnected.to_string(),
                    ],
                    map_row,
                )
                .optional()
                .map_err(map_sql_error)
            })
            .await
    }

    #[instrument(skip(self))]
    async fn list_for_family(&self, family_id: Uuid) -> Result<Vec<CalendarConnection>> {
        self.db
            .run(move |conn| {
                let sql = format!("{SELECT_COLUMNS} WHERE family_id = ?1 ORDER BY created_at, id");
                let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
                let rows =
                    stmt.query_map(params![family_id.to_string()], map_row).map_err(map_sql_error)?;
                let connections =
                    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?;
                Ok(connections)
            })
            .await
    }
}

fn load(conn: &Connection, id: Uuid) -> Result<Option<CalendarConnection>> {
    let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
    conn.query_row(&sql, params![id.to_string()], map_row).optional().map_err(map_sql_error)
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<CalendarConnection> {
    Ok(CalendarConnection {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        family_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
        provider: parse_text(2, &row.get::<_, String>(2)?)?,
        external_account_id: row.get(3)?,
        external_calendar_id: row.get(4)?,
        display_name: row.get(5)?,
        status: parse_text(6, &row.get::<_, String>(6)?)?,
        assigned_member_ids: from_json(7, &row.get::<_, String>(7)?)?,
        color: row.get(8)?,
        is_enabled: row.get(9)?,
        is_read_only: row.get(10)?,
        sync_settings: from_json(11, &row.get::<_, String>(11)?)?,
        last_synced_at: row
            .get::<_, Option<i64>>(12)?
            .map(|micros| from_micros(12, micros))
            .transpose()?,
        next_sync_at: from_micros(13, row.get(13)?)?,
        last_sync_error: row.get(14)?,
        consecutive_failures: row.get(15)?,
        created_at: from_micros(16, row.get(16)?)?,
        updated_at: from_micros(17, row.get(17)?)?,
        version: Version(row.get(18)?),
    })
}
