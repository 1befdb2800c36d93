//! PostgreSQL backend for the state store. Tables:
//! - `startup_notice`: one row per startup notice delivered
//! - `poll_cursor`: seconds-since-epoch high-water marks of processed upstream data
//! - `token_history`: OAuth grants, newest by `retrieved_at` (ms)
//!
//! Every value is bound as a parameter. Table and column names are
//! interpolated only from [`Table`], never from input.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use super::traits::{Connector, StateBackend, Table};
use crate::error::StoreResult;
use crate::token::{StoredToken, TokenRecord};

/// Opens a pooled PostgreSQL connection from a database URL.
pub struct PgConnector {
    database_url: String,
    max_connections: u32,
}

impl PgConnector {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 5,
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Handle = PgBackend;

    async fn connect(&self) -> StoreResult<PgBackend> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await?;

        Ok(PgBackend { pool })
    }
}

/// Live PostgreSQL handle. Cloning shares the underlying pool.
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StateBackend for PgBackend {
    async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS startup_notice (
                id          BIGSERIAL PRIMARY KEY,
                received    BOOLEAN NOT NULL,
                inserted_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_cursor (
                id          BIGSERIAL PRIMARY KEY,
                cursor_time BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS token_history (
                id            BIGSERIAL PRIMARY KEY,
                access_token  TEXT NOT NULL,
                refresh_token TEXT NOT NULL DEFAULT '',
                token_type    TEXT NOT NULL DEFAULT '',
                expires_in    BIGINT NOT NULL DEFAULT 0,
                scope         TEXT NOT NULL DEFAULT '',
                raw_response  TEXT NOT NULL DEFAULT '',
                retrieved_at  BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_poll_cursor_time ON poll_cursor(cursor_time, id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_token_history_retrieved ON token_history(retrieved_at, id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_rows(&self, table: Table) -> StoreResult<i64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn delete_oldest(&self, table: Table, limit: i64) -> StoreResult<u64> {
        let order = table.order_column();
        let affected = sqlx::query(&format!(
            "DELETE FROM {table} WHERE id IN (SELECT id FROM {table} ORDER BY {order} ASC, id ASC LIMIT $1)"
        ))
        .bind(limit)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected)
    }

    async fn latest_startup_notice(&self) -> StoreResult<Option<bool>> {
        let row = sqlx::query("SELECT received FROM startup_notice ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.try_get(0)).transpose()?)
    }

    async fn insert_startup_notice(&self, received: bool) -> StoreResult<()> {
        sqlx::query("INSERT INTO startup_notice (received) VALUES ($1)")
            .bind(received)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn latest_poll_cursor(&self) -> StoreResult<Option<i64>> {
        let row = sqlx::query(
            "SELECT cursor_time FROM poll_cursor ORDER BY cursor_time DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.try_get(0)).transpose()?)
    }

    async fn insert_poll_cursor(&self, cursor_time: i64) -> StoreResult<()> {
        sqlx::query("INSERT INTO poll_cursor (cursor_time) VALUES ($1)")
            .bind(cursor_time)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn latest_token(&self) -> StoreResult<Option<StoredToken>> {
        let row = sqlx::query(
            r#"
            SELECT access_token, refresh_token, token_type, expires_in, scope,
                   raw_response, retrieved_at
            FROM token_history
            ORDER BY retrieved_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        Ok(Some(StoredToken {
            retrieved_at_ms: row.try_get(6)?,
            token: TokenRecord {
                access_token: row.try_get(0)?,
                refresh_token: row.try_get(1)?,
                token_type: row.try_get(2)?,
                expires_in: row.try_get(3)?,
                scope: row.try_get(4)?,
                raw_response: row.try_get(5)?,
            },
        }))
    }

    async fn insert_token(&self, token: &TokenRecord, retrieved_at_ms: i64) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO token_history
                (access_token, refresh_token, token_type, expires_in, scope, raw_response, retrieved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&token.access_token)
        .bind(&token.refresh_token)
        .bind(&token.token_type)
        .bind(token.expires_in)
        .bind(&token.scope)
        .bind(&token.raw_response)
        .bind(retrieved_at_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
