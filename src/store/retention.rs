//! Read-triggered retention for the capped history tables.
//!
//! Each prune is a fixed-size trim: once a table holds more than `cap` rows,
//! exactly `cap` of the oldest rows are deleted, however far over the cap it
//! is. A table with 50 rows and a cap of 20 keeps 30 after one pass; repeated
//! prunes converge on the cap.

use tracing::{info, warn};

use super::traits::{StateBackend, Table};

/// Rows kept per capped stream.
pub const RETENTION_CAP: i64 = 20;

/// What a single prune pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneOutcome {
    WithinCap { rows: i64 },
    Trimmed { before: i64, deleted: u64 },
    /// The count or delete failed; the table may stay over cap until the next read.
    Failed,
}

/// Trim `table` if it exceeds `cap`. Never fails: errors are logged and reported as
/// [`PruneOutcome::Failed`], and the caller's read proceeds regardless.
pub async fn prune<B: StateBackend>(backend: &B, table: Table, cap: i64) -> PruneOutcome {
    let count = match backend.count_rows(table).await {
        Ok(count) => count,
        Err(e) => {
            warn!(%table, "Failed to count rows for retention: {e}");
            return PruneOutcome::Failed;
        }
    };

    if count <= cap {
        return PruneOutcome::WithinCap { rows: count };
    }

    info!(%table, rows = count, cap, "Table over retention cap, removing oldest {cap}");

    match backend.delete_oldest(table, cap).await {
        Ok(deleted) => PruneOutcome::Trimmed {
            before: count,
            deleted,
        },
        Err(e) => {
            warn!(%table, "Failed to delete oldest rows: {e}");
            PruneOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryBackend;

    async fn fill_cursors(backend: &MemoryBackend, n: i64) {
        for t in 0..n {
            backend.insert_poll_cursor(1_000 + t).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_prune_within_cap_is_noop() {
        let backend = MemoryBackend::new();
        fill_cursors(&backend, 20).await;

        let outcome = prune(&backend, Table::PollCursor, RETENTION_CAP).await;
        assert_eq!(outcome, PruneOutcome::WithinCap { rows: 20 });
        assert_eq!(backend.count_rows(Table::PollCursor).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_prune_trims_exactly_cap_rows() {
        let backend = MemoryBackend::new();
        fill_cursors(&backend, 50).await;

        let outcome = prune(&backend, Table::PollCursor, RETENTION_CAP).await;
        assert_eq!(
            outcome,
            PruneOutcome::Trimmed {
                before: 50,
                deleted: 20
            }
        );
        assert_eq!(backend.count_rows(Table::PollCursor).await.unwrap(), 30);
        // The newest rows survive.
        assert_eq!(backend.latest_poll_cursor().await.unwrap(), Some(1_049));
    }

    #[tokio::test]
    async fn test_repeated_prunes_converge_on_cap() {
        let backend = MemoryBackend::new();
        fill_cursors(&backend, 65).await;

        let mut passes = 0;
        while let PruneOutcome::Trimmed { .. } =
            prune(&backend, Table::PollCursor, RETENTION_CAP).await
        {
            passes += 1;
        }

        assert_eq!(passes, 3);
        assert_eq!(backend.count_rows(Table::PollCursor).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_prune_deletes_oldest_by_order_column_not_insertion() {
        let backend = MemoryBackend::new();
        // Insert newest first so insertion order and cursor order disagree.
        for t in (0..21).rev() {
            backend.insert_poll_cursor(t).await.unwrap();
        }

        prune(&backend, Table::PollCursor, RETENTION_CAP).await;
        assert_eq!(backend.count_rows(Table::PollCursor).await.unwrap(), 1);
        assert_eq!(backend.latest_poll_cursor().await.unwrap(), Some(20));
    }

    #[tokio::test]
    async fn test_prune_failure_is_reported_not_raised() {
        let backend = MemoryBackend::new();
        fill_cursors(&backend, 25).await;
        backend.set_failing(true);

        assert_eq!(
            prune(&backend, Table::PollCursor, RETENTION_CAP).await,
            PruneOutcome::Failed
        );

        backend.set_failing(false);
        assert_eq!(backend.count_rows(Table::PollCursor).await.unwrap(), 25);
    }
}
