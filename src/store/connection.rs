//! Lazily established, shared connection handle with unbounded fixed-delay retry.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::traits::Connector;
use crate::error::{StoreError, StoreResult};

/// Delay between failed connection attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Owns the single connection handle for the process.
///
/// The handle is created on the first [`acquire`](Self::acquire) and reused
/// afterwards. Acquisition is serialized, so only one caller ever runs the
/// connect-and-retry loop; the rest wait on the lock and get the cached handle.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    handle: Mutex<Option<C::Handle>>,
    retry_interval: Duration,
    cancel: CancellationToken,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            handle: Mutex::new(None),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            cancel: CancellationToken::new(),
        }
    }

    /// Override the retry delay. A zero delay keeps [`DEFAULT_RETRY_INTERVAL`].
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            warn!("Ignoring zero retry interval, keeping {DEFAULT_RETRY_INTERVAL:?}");
        } else {
            self.retry_interval = interval;
        }
        self
    }

    /// Stop retrying once `cancel` fires. Without this the loop never gives up.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Whether a handle has been established yet.
    pub async fn is_connected(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Return the shared handle, connecting first if needed.
    ///
    /// Blocks until a connection succeeds. The only error is
    /// [`StoreError::Cancelled`].
    pub async fn acquire(&self) -> StoreResult<C::Handle> {
        let mut slot = self.handle.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }

        let mut attempt: u64 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }

            attempt += 1;
            info!(attempt, "No database connection, creating one");

            match self.connector.connect().await {
                Ok(handle) => {
                    info!(attempt, "Database connection established");
                    *slot = Some(handle.clone());
                    return Ok(handle);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        retry_in_secs = self.retry_interval.as_secs_f64(),
                        "Database connection failed: {e}"
                    );
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!(attempt, "Database connection retry cancelled");
                    return Err(StoreError::Cancelled);
                }
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }
}
