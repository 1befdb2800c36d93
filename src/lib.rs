pub mod config;
pub mod crypto;
pub mod error;
pub mod store;
pub mod token;

pub use config::Config;
pub use error::{StoreError, StoreResult};
pub use store::StateStore;
pub use token::{StoredToken, TokenRecord};

use store::PgConnector;

/// Build the production store from configuration.
pub fn postgres_store(
    config: &Config,
    cancel: tokio_util::sync::CancellationToken,
) -> StoreResult<StateStore<PgConnector>> {
    let connector = PgConnector::new(config.database_url.clone())
        .with_max_connections(config.max_connections);

    let mut store = StateStore::new(connector)
        .with_retry_interval(config.retry_interval)
        .with_cancellation(cancel);

    if let Some(key) = &config.token_encryption_key {
        store = store.with_cipher(crypto::TokenCipher::new(key)?);
    }

    Ok(store)
}
