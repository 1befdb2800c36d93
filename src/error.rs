/// Unified error type for the state store.
///
/// Public store operations collapse these into fallback values; the `try_*`
/// variants on [`crate::store::StateStore`] surface them directly.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    // ── Connectivity ────────────────────────────────────────────────────
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Connection attempt cancelled")]
    Cancelled,

    // ── Data ────────────────────────────────────────────────────────────
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}

impl StoreError {
    /// True when the error came from the cancellation token rather than the store.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StoreError::Cancelled)
    }
}
