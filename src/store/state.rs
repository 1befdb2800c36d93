//! The public state store: startup-notice flag, poll cursor and token history.
//!
//! None of the plain operations return errors. Reads fall back to a fixed
//! value and writes are dropped after logging; the `try_*` twins keep
//! "nothing stored" (`Ok(None)`) apart from "the store failed" (`Err`).

use chrono::Utc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::ConnectionManager;
use super::retention::{prune, PruneOutcome};
use super::traits::{Connector, StateBackend, Table};
use crate::crypto::TokenCipher;
use crate::error::StoreResult;
use crate::token::{StoredToken, TokenRecord};

/// Durable bot state over one shared, lazily established connection.
pub struct StateStore<C: Connector> {
    connections: ConnectionManager<C>,
    cipher: Option<TokenCipher>,
}

impl<C: Connector> StateStore<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connections: ConnectionManager::new(connector),
            cipher: None,
        }
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.connections = self.connections.with_retry_interval(interval);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.connections = self.connections.with_cancellation(cancel);
        self
    }

    /// Encrypt token secrets before they reach the database.
    pub fn with_cipher(mut self, cipher: TokenCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn connections(&self) -> &ConnectionManager<C> {
        &self.connections
    }

    /// Create the tables if needed. Blocks until the database is reachable.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        let backend = self.connections.acquire().await?;
        backend.ensure_schema().await
    }

    /// Trim a capped table before it is read. Unbounded tables are left alone.
    async fn prune(&self, backend: &C::Handle, table: Table) -> Option<PruneOutcome> {
        let cap = table.cap()?;
        let outcome = prune(backend, table, cap).await;
        if let PruneOutcome::Trimmed { before, deleted } = outcome {
            debug!(%table, before, deleted, "Pruned history");
        }
        Some(outcome)
    }

    // ── Startup notice ──────────────────────────────────────────────────

    pub async fn try_was_startup_notice_sent(&self) -> StoreResult<Option<bool>> {
        let backend = self.connections.acquire().await?;
        backend.latest_startup_notice().await
    }

    /// Whether the one-time startup notice has already gone out.
    pub async fn was_startup_notice_sent(&self) -> bool {
        match self.try_was_startup_notice_sent().await {
            Ok(Some(received)) => received,
            Ok(None) => {
                debug!("No startup notice recorded");
                false
            }
            Err(e) => {
                warn!("Failed to read startup notice flag: {e}");
                false
            }
        }
    }

    pub async fn try_mark_startup_notice_sent(&self) -> StoreResult<()> {
        let backend = self.connections.acquire().await?;
        backend.insert_startup_notice(true).await
    }

    /// Record the startup notice as delivered. Repeated calls append repeated rows.
    pub async fn mark_startup_notice_sent(&self) {
        info!("Marking startup notice sent");
        match self.try_mark_startup_notice_sent().await {
            Ok(()) => info!("Startup notice marked sent"),
            Err(e) => warn!("Failed to mark startup notice sent: {e}"),
        }
    }

    // ── Poll cursor ─────────────────────────────────────────────────────

    pub async fn try_latest_poll_cursor(&self) -> StoreResult<Option<i64>> {
        let backend = self.connections.acquire().await?;
        self.prune(&backend, Table::PollCursor).await;
        backend.latest_poll_cursor().await
    }

    /// Seconds since epoch through which upstream data has been processed.
    /// Falls back to now, so a fresh or unreadable store starts from the present.
    pub async fn latest_poll_cursor(&self) -> i64 {
        match self.try_latest_poll_cursor().await {
            Ok(Some(cursor)) => cursor,
            Ok(None) => {
                debug!("No poll cursor stored, starting from now");
                Utc::now().timestamp()
            }
            Err(e) => {
                warn!("Failed to read poll cursor, starting from now: {e}");
                Utc::now().timestamp()
            }
        }
    }

    /// Stores the current time as the cursor and returns it.
    pub async fn try_save_poll_cursor(&self) -> StoreResult<i64> {
        let backend = self.connections.acquire().await?;
        let now = Utc::now().timestamp();
        backend.insert_poll_cursor(now).await?;
        Ok(now)
    }

    pub async fn save_poll_cursor(&self) {
        match self.try_save_poll_cursor().await {
            Ok(cursor) => info!(cursor, "Poll cursor saved"),
            Err(e) => warn!("Failed to save poll cursor: {e}"),
        }
    }

    // ── Token history ───────────────────────────────────────────────────

    pub async fn try_latest_token_record(&self) -> StoreResult<Option<StoredToken>> {
        let backend = self.connections.acquire().await?;
        self.prune(&backend, Table::TokenHistory).await;
        match backend.latest_token().await? {
            Some(stored) => Ok(Some(self.open(stored)?)),
            None => Ok(None),
        }
    }

    /// The most recent grant with its save time in milliseconds, or `None` when a
    /// fresh authorization is needed.
    pub async fn latest_token_record(&self) -> Option<StoredToken> {
        match self.try_latest_token_record().await {
            Ok(Some(stored)) => Some(stored),
            Ok(None) => {
                debug!("No token history stored");
                None
            }
            Err(e) => {
                warn!("Failed to read token history: {e}");
                None
            }
        }
    }

    /// Stores `token` stamped with the current time and returns that time in ms.
    pub async fn try_save_token_record(&self, token: &TokenRecord) -> StoreResult<i64> {
        let backend = self.connections.acquire().await?;
        let sealed = self.seal(token)?;
        let now_ms = Utc::now().timestamp_millis();
        backend.insert_token(&sealed, now_ms).await?;
        Ok(now_ms)
    }

    pub async fn save_token_record(&self, token: &TokenRecord) {
        info!("Saving token data");
        match self.try_save_token_record(token).await {
            Ok(retrieved_at_ms) => info!(retrieved_at_ms, "Token data saved"),
            Err(e) => warn!("Failed to save token data: {e}"),
        }
    }

    fn seal(&self, token: &TokenRecord) -> StoreResult<TokenRecord> {
        let Some(cipher) = &self.cipher else {
            return Ok(token.clone());
        };
        Ok(TokenRecord {
            access_token: cipher.encrypt(&token.access_token)?,
            refresh_token: cipher.encrypt(&token.refresh_token)?,
            raw_response: cipher.encrypt(&token.raw_response)?,
            ..token.clone()
        })
    }

    fn open(&self, stored: StoredToken) -> StoreResult<StoredToken> {
        let Some(cipher) = &self.cipher else {
            return Ok(stored);
        };
        let token = stored.token;
        Ok(StoredToken {
            retrieved_at_ms: stored.retrieved_at_ms,
            token: TokenRecord {
                access_token: cipher.decrypt(&token.access_token)?,
                refresh_token: cipher.decrypt(&token.refresh_token)?,
                raw_response: cipher.decrypt(&token.raw_response)?,
                ..token
            },
        })
    }
}
