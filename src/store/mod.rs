//! State store — PostgreSQL-backed poll cursor, startup notice and token history.
//!
//! [`StateStore`] is the entry point. It sits on a [`ConnectionManager`] that
//! owns the one shared handle, and trims capped tables through [`retention`]
//! before reading them.

pub mod connection;
pub mod db;
pub mod memory;
pub mod retention;
pub mod state;
pub mod traits;

pub use connection::{ConnectionManager, DEFAULT_RETRY_INTERVAL};
pub use db::{PgBackend, PgConnector};
pub use memory::{MemoryBackend, MemoryConnector};
pub use retention::{PruneOutcome, RETENTION_CAP};
pub use state::StateStore;
pub use traits::{Connector, StateBackend, Table};
