use anyhow::Result;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use alertbot_state::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alertbot_state=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!("alertbot-state v{}", env!("CARGO_PKG_VERSION"));
    info!("Config: {config}");

    // Ctrl-C aborts the connection retry loop.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, shutting down");
            on_signal.cancel();
        }
    });

    let store = alertbot_state::postgres_store(&config, cancel)?;
    store.ensure_schema().await?;
    info!("Database connected and schema ready ✓");

    let startup_notice_sent = store.was_startup_notice_sent().await;
    let poll_cursor = store.latest_poll_cursor().await;
    info!(startup_notice_sent, poll_cursor, "Poll state");

    match store.latest_token_record().await {
        Some(stored) => info!(
            retrieved_at_ms = stored.retrieved_at_ms,
            expired = stored.is_expired_at(Utc::now().timestamp_millis()),
            has_refresh_token = stored.token.has_refresh_token(),
            "Token history present"
        ),
        None => info!("No stored token, a fresh grant is required"),
    }

    Ok(())
}
