//! SQLite-backed record store using sqlx.
//!
//! Schema:
//! - `access_tokens` / `refresh_tokens(token_id PK, token_json, authentication_json,
//!   authentication_key, client_id, user_name, linked_token, expires_at, created_at)`
//! - `auth_key_index(authentication_key PK, token_id)`
//! - `refresh_link_index(refresh_token PK, token_id)`
//!
//! Every [`Batch`] runs inside one transaction; a failing statement rolls the
//! whole batch back.

use crate::backend::{Batch, Mutation, RecordBackend};
use crate::record::StoredRecord;
use async_trait::async_trait;
use grantstore_types::{AuthenticationKey, StoreStats, TokenKind, traits::Result};
use sqlx::{
    Sqlite, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::str::FromStr;

type RecordRow = (
    String,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<i64>,
);

const RECORD_COLUMNS: &str = "token_id, token_json, authentication_json, authentication_key, \
                              client_id, user_name, linked_token, expires_at";

fn table(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Access => "access_tokens",
        TokenKind::Refresh => "refresh_tokens",
    }
}

fn to_db_time(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

fn from_db_time(secs: i64) -> u64 {
    u64::try_from(secs).unwrap_or(0)
}

fn from_row(kind: TokenKind, row: RecordRow) -> StoredRecord {
    let (value, token_json, authentication_json, key, client_id, user_name, linked, expires_at) =
        row;
    StoredRecord {
        value,
        kind,
        token_json,
        authentication_json,
        authentication_key: key.map(AuthenticationKey::from_raw),
        client_id,
        user_name,
        linked,
        expires_at: expires_at.map(from_db_time),
    }
}

/// A persistent [`RecordBackend`] backed by `SQLite`.
pub struct SqliteBackend {
    /// Connection pool to the `SQLite` database.
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Connects to a `SQLite` database (e.g. `"sqlite:./grants.db"` or `"sqlite::memory:"`).
    ///
    /// Creates the database file if it does not exist and runs migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`sqlx::Error`] if the connection or table creation fails.
    pub async fn new(database_url: &str) -> std::result::Result<Self, sqlx::Error> {
        let in_memory = database_url.contains(":memory:");
        let mut opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        if !in_memory {
            opts = opts.journal_mode(SqliteJournalMode::Wal);
        }
        // An in-memory database lives exactly as long as its last connection,
        // so it gets one connection that is never reaped.
        let pool_opts = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_opts.connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Create tables and indices (idempotent).
    async fn migrate(pool: &SqlitePool) -> std::result::Result<(), sqlx::Error> {
        for kind in [TokenKind::Access, TokenKind::Refresh] {
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    token_id            TEXT    PRIMARY KEY,
                    token_json          TEXT    NOT NULL,
                    authentication_json TEXT    NOT NULL,
                    authentication_key  TEXT,
                    client_id           TEXT    NOT NULL,
                    user_name           TEXT,
                    linked_token        TEXT,
                    expires_at          INTEGER,
                    created_at          INTEGER NOT NULL DEFAULT (unixepoch())
                )",
                table(kind)
            ))
            .execute(pool)
            .await?;
        }

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_access_client
             ON access_tokens(client_id, user_name)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_access_linked
             ON access_tokens(linked_token)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS auth_key_index (
                authentication_key TEXT PRIMARY KEY,
                token_id           TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS refresh_link_index (
                refresh_token TEXT PRIMARY KEY,
                token_id      TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn apply_one(
        tx: &mut Transaction<'_, Sqlite>,
        mutation: Mutation,
    ) -> std::result::Result<(), sqlx::Error> {
        match mutation {
            Mutation::PutRecord(record) => {
                sqlx::query(&format!(
                    "INSERT INTO {} ({RECORD_COLUMNS})
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(token_id) DO UPDATE SET
                         token_json = excluded.token_json,
                         authentication_json = excluded.authentication_json,
                         authentication_key = excluded.authentication_key,
                         client_id = excluded.client_id,
                         user_name = excluded.user_name,
                         linked_token = excluded.linked_token,
                         expires_at = excluded.expires_at",
                    table(record.kind)
                ))
                .bind(&record.value)
                .bind(&record.token_json)
                .bind(&record.authentication_json)
                .bind(record.authentication_key.as_ref().map(AuthenticationKey::as_str))
                .bind(&record.client_id)
                .bind(&record.user_name)
                .bind(&record.linked)
                .bind(record.expires_at.map(to_db_time))
                .execute(&mut **tx)
                .await?;
            }
            Mutation::DeleteRecord { kind, value } => {
                sqlx::query(&format!("DELETE FROM {} WHERE token_id = ?", table(kind)))
                    .bind(&value)
                    .execute(&mut **tx)
                    .await?;
            }
            Mutation::SetAuthKey { key, access_value } => {
                sqlx::query(
                    "INSERT INTO auth_key_index (authentication_key, token_id) VALUES (?, ?)
                     ON CONFLICT(authentication_key) DO UPDATE SET token_id = excluded.token_id",
                )
                .bind(key.as_str())
                .bind(&access_value)
                .execute(&mut **tx)
                .await?;
            }
            Mutation::ClearAuthKey { key, access_value } => {
                sqlx::query(
                    "DELETE FROM auth_key_index WHERE authentication_key = ? AND token_id = ?",
                )
                .bind(key.as_str())
                .bind(&access_value)
                .execute(&mut **tx)
                .await?;
            }
            Mutation::SetRefreshLink {
                refresh_value,
                access_value,
            } => {
                sqlx::query(
                    "INSERT INTO refresh_link_index (refresh_token, token_id) VALUES (?, ?)
                     ON CONFLICT(refresh_token) DO UPDATE SET token_id = excluded.token_id",
                )
                .bind(&refresh_value)
                .bind(&access_value)
                .execute(&mut **tx)
                .await?;
            }
            Mutation::ClearRefreshLink {
                refresh_value,
                only_if: Some(access_value),
            } => {
                sqlx::query("DELETE FROM refresh_link_index WHERE refresh_token = ? AND token_id = ?")
                    .bind(&refresh_value)
                    .bind(&access_value)
                    .execute(&mut **tx)
                    .await?;
            }
            Mutation::ClearRefreshLink {
                refresh_value,
                only_if: None,
            } => {
                sqlx::query("DELETE FROM refresh_link_index WHERE refresh_token = ?")
                    .bind(&refresh_value)
                    .execute(&mut **tx)
                    .await?;
            }
            Mutation::Clear => {
                for stmt in [
                    "DELETE FROM access_tokens",
                    "DELETE FROM refresh_tokens",
                    "DELETE FROM auth_key_index",
                    "DELETE FROM refresh_link_index",
                ] {
                    sqlx::query(stmt).execute(&mut **tx).await?;
                }
            }
        }
        Ok(())
    }

    async fn count(&self, table: &str) -> std::result::Result<u64, sqlx::Error> {
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}

#[async_trait]
impl RecordBackend for SqliteBackend {
    async fn get(&self, kind: TokenKind, value: &str) -> Result<Option<StoredRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM {} WHERE token_id = ?",
            table(kind)
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| from_row(kind, r)))
    }

    async fn access_by_auth_key(&self, key: &AuthenticationKey) -> Result<Option<String>> {
        Ok(
            sqlx::query_scalar::<_, String>("SELECT token_id FROM auth_key_index WHERE authentication_key = ?")
                .bind(key.as_str())
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn access_by_refresh(&self, refresh_value: &str) -> Result<Option<String>> {
        Ok(
            sqlx::query_scalar::<_, String>("SELECT token_id FROM refresh_link_index WHERE refresh_token = ?")
                .bind(refresh_value)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_access_by_link(&self, refresh_value: &str) -> Result<Vec<StoredRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM access_tokens WHERE linked_token = ? ORDER BY token_id"
        ))
        .bind(refresh_value)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| from_row(TokenKind::Access, row))
            .collect())
    }

    async fn find_access(
        &self,
        client_id: &str,
        user_name: Option<&str>,
    ) -> Result<Vec<StoredRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM access_tokens
             WHERE client_id = ? AND (? IS NULL OR user_name = ?)
             ORDER BY token_id"
        ))
        .bind(client_id)
        .bind(user_name)
        .bind(user_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| from_row(TokenKind::Access, r))
            .collect())
    }

    async fn expired(&self, now: u64) -> Result<Vec<StoredRecord>> {
        let mut out = Vec::new();
        for kind in [TokenKind::Access, TokenKind::Refresh] {
            let rows: Vec<RecordRow> = sqlx::query_as(&format!(
                "SELECT {RECORD_COLUMNS} FROM {}
                 WHERE expires_at IS NOT NULL AND expires_at <= ?",
                table(kind)
            ))
            .bind(to_db_time(now))
            .fetch_all(&self.pool)
            .await?;
            out.extend(rows.into_iter().map(|r| from_row(kind, r)));
        }
        Ok(out)
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            access_tokens: self.count("access_tokens").await?,
            refresh_tokens: self.count("refresh_tokens").await?,
            auth_key_entries: self.count("auth_key_index").await?,
            refresh_links: self.count("refresh_link_index").await?,
        })
    }

    async fn apply(&self, batch: Batch) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for mutation in batch {
            Self::apply_one(&mut tx, mutation).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
