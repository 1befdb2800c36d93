//! In-process backend for development and tests.
//!
//! Mirrors the Postgres semantics row for row: a per-table insertion sequence
//! stands in for `BIGSERIAL id`, and "oldest" / "latest" order by the table's
//! order column with the sequence as tiebreak. Connect and query failures can
//! be injected to exercise the retry and fallback paths.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::traits::{Connector, StateBackend, Table};
use crate::error::{StoreError, StoreResult};
use crate::token::{StoredToken, TokenRecord};

#[derive(Debug, Default)]
struct Tables {
    next_seq: u64,
    startup_notice: Vec<(u64, bool)>,
    poll_cursor: Vec<(u64, i64)>,
    token_history: Vec<(u64, StoredToken)>,
}

impl Tables {
    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Removes the `limit` rows with the smallest `(key, seq)` from `rows`.
fn remove_oldest<T>(rows: &mut Vec<(u64, T)>, limit: i64, key: impl Fn(&(u64, T)) -> i64) -> u64 {
    let limit = usize::try_from(limit).unwrap_or(0).min(rows.len());
    rows.sort_by_key(|row| (key(row), row.0));
    rows.drain(..limit);
    limit as u64
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<Mutex<Tables>>,
    failing: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent statement fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected query failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl StateBackend for MemoryBackend {
    async fn ensure_schema(&self) -> StoreResult<()> {
        self.check()
    }

    async fn count_rows(&self, table: Table) -> StoreResult<i64> {
        self.check()?;
        let tables = self.tables.lock().await;
        let count = match table {
            Table::StartupNotice => tables.startup_notice.len(),
            Table::PollCursor => tables.poll_cursor.len(),
            Table::TokenHistory => tables.token_history.len(),
        };
        Ok(count as i64)
    }

    async fn delete_oldest(&self, table: Table, limit: i64) -> StoreResult<u64> {
        self.check()?;
        let mut tables = self.tables.lock().await;
        let removed = match table {
            Table::StartupNotice => remove_oldest(&mut tables.startup_notice, limit, |r| r.0 as i64),
            Table::PollCursor => remove_oldest(&mut tables.poll_cursor, limit, |r| r.1),
            Table::TokenHistory => {
                remove_oldest(&mut tables.token_history, limit, |r| r.1.retrieved_at_ms)
            }
        };
        Ok(removed)
    }

    async fn latest_startup_notice(&self) -> StoreResult<Option<bool>> {
        self.check()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .startup_notice
            .iter()
            .max_by_key(|(seq, _)| *seq)
            .map(|(_, received)| *received))
    }

    async fn insert_startup_notice(&self, received: bool) -> StoreResult<()> {
        self.check()?;
        let mut tables = self.tables.lock().await;
        let seq = tables.seq();
        tables.startup_notice.push((seq, received));
        Ok(())
    }

    async fn latest_poll_cursor(&self) -> StoreResult<Option<i64>> {
        self.check()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .poll_cursor
            .iter()
            .max_by_key(|(seq, cursor)| (*cursor, *seq))
            .map(|(_, cursor)| *cursor))
    }

    async fn insert_poll_cursor(&self, cursor_time: i64) -> StoreResult<()> {
        self.check()?;
        let mut tables = self.tables.lock().await;
        let seq = tables.seq();
        tables.poll_cursor.push((seq, cursor_time));
        Ok(())
    }

    async fn latest_token(&self) -> StoreResult<Option<StoredToken>> {
        self.check()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .token_history
            .iter()
            .max_by_key(|(seq, stored)| (stored.retrieved_at_ms, *seq))
            .map(|(_, stored)| stored.clone()))
    }

    async fn insert_token(&self, token: &TokenRecord, retrieved_at_ms: i64) -> StoreResult<()> {
        self.check()?;
        let mut tables = self.tables.lock().await;
        let seq = tables.seq();
        tables.token_history.push((
            seq,
            StoredToken {
                retrieved_at_ms,
                token: token.clone(),
            },
        ));
        Ok(())
    }
}

/// Hands out one shared [`MemoryBackend`], optionally failing the first few attempts.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    backend: MemoryBackend,
    fail_first: u32,
    attempts: Arc<AtomicU32>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the first `n` connection attempts.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    pub fn backend(&self) -> MemoryBackend {
        self.backend.clone()
    }

    /// Shared counter of connection attempts made so far.
    pub fn attempts_counter(&self) -> Arc<AtomicU32> {
        self.attempts.clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Handle = MemoryBackend;

    async fn connect(&self) -> StoreResult<MemoryBackend> {
        let previous = self.attempts.fetch_add(1, Ordering::SeqCst);
        if previous < self.fail_first {
            return Err(StoreError::Backend(format!(
                "connection refused (attempt {})",
                previous + 1
            )));
        }
        Ok(self.backend.clone())
    }
}
