//! SQLite implementation of the CredentialStore port.
//!
//! Tokens are stored as a JSON document per connection.

use async_trait::async_trait;
use chrono::Utc;
use hearthsync_core::CredentialStore;
use hearthsync_domain::{Result, TokenSet};
use rusqlite::{params, OptionalExtension};
use tracing::instrument;
use uuid::Uuid;

use super::codec::{from_json, to_json, to_micros};
use super::manager::{map_sql_error, DbManager};

#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    db: DbManager,
}

impl SqliteCredentialStore {
    pub fn new(db: DbManager) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    #[instrument(skip(self))]
    async fn get(&self, connection_id: Uuid) -> Result<Option<TokenSet>> {
        self.db
            .run(move |conn| {
                conn.query_row(
                    "SELECT token_json FROM connection_credentials WHERE connection_id = ?1",
                    params![connection_id.to_string()],
                    |row| from_json::<TokenSet>(0, &row.get::<_, String>(0)?),
                )
                .optional()
                .map_err(map_sql_error)
            })
            .await
    }

    #[instrument(skip(self, tokens))]
    async fn put(&self, connection_id: Uuid, tokens: &TokenSet) -> Result<()> {
        let encoded = to_json(tokens).map_err(map_sql_error)?;
        self.db
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO connection_credentials (connection_id, token_json, updated_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(connection_id) DO UPDATE SET
                        token_json = excluded.token_json,
                        updated_at = excluded.updated_at",
                    params![connection_id.to_string(), encoded, to_micros(Utc::now())],
                )
                .map_err(map_sql_error)?;
                Ok(())
            })
            .await
    }

    #[instrument(skip(self))]
    async fn delete(&self, connection_id: Uuid) -> Result<()> {
        self.db
            .run(move |conn| {
                conn.execute(
                    "DELETE FROM connection_credentials WHERE connection_id = ?1",
                    params![connection_id.to_string()],
                )
                .map_err(map_sql_error)?;
                Ok(())
            })
            .await
    }
}
