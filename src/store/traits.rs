use async_trait::async_trait;

use crate::error::StoreResult;
use crate::token::{StoredToken, TokenRecord};

/// The three record streams kept by the store.
///
/// Table and column names only ever come from here, so the few statements
/// that interpolate a table name never see caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    StartupNotice,
    PollCursor,
    TokenHistory,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::StartupNotice, Table::PollCursor, Table::TokenHistory];

    pub fn name(self) -> &'static str {
        match self {
            Table::StartupNotice => "startup_notice",
            Table::PollCursor => "poll_cursor",
            Table::TokenHistory => "token_history",
        }
    }

    /// Column whose maximum defines the latest row.
    pub fn order_column(self) -> &'static str {
        match self {
            Table::StartupNotice => "id",
            Table::PollCursor => "cursor_time",
            Table::TokenHistory => "retrieved_at",
        }
    }

    /// Retention cap, or `None` for unbounded streams.
    pub fn cap(self) -> Option<i64> {
        match self {
            Table::StartupNotice => None,
            Table::PollCursor | Table::TokenHistory => Some(super::RETENTION_CAP),
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Row-level primitives over a live connection handle.
///
/// Implementations execute exactly one statement per call; fallbacks and
/// retention policy live above this trait in [`super::StateStore`].
#[async_trait]
pub trait StateBackend: Clone + Send + Sync + 'static {
    /// Create the tables and indexes if they do not exist yet.
    async fn ensure_schema(&self) -> StoreResult<()>;

    async fn count_rows(&self, table: Table) -> StoreResult<i64>;

    /// Delete the `limit` oldest rows by the table's order column. Returns rows removed.
    async fn delete_oldest(&self, table: Table, limit: i64) -> StoreResult<u64>;

    async fn latest_startup_notice(&self) -> StoreResult<Option<bool>>;

    async fn insert_startup_notice(&self, received: bool) -> StoreResult<()>;

    async fn latest_poll_cursor(&self) -> StoreResult<Option<i64>>;

    async fn insert_poll_cursor(&self, cursor_time: i64) -> StoreResult<()>;

    async fn latest_token(&self) -> StoreResult<Option<StoredToken>>;

    async fn insert_token(&self, token: &TokenRecord, retrieved_at_ms: i64) -> StoreResult<()>;
}

/// Opens connection handles for a [`super::ConnectionManager`].
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Handle: StateBackend;

    async fn connect(&self) -> StoreResult<Self::Handle>;
}
