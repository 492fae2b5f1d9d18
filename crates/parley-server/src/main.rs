//! # parley-server
//!
//! Real-time direct messaging server.
//!
//! This binary provides:
//! - **WebSocket endpoint** (`/ws`) for live chat, deletions, reactions and
//!   call signaling between online users
//! - **REST API** (axum) for pull reconciliation, synchronous sends and the
//!   user directory
//! - **SQLite message store** holding the durable conversation state
//! - **Rate limiting** per client IP (HTTP) and per identity (WebSocket)

mod api;
mod config;
mod error;
mod policy;
mod presence;
mod rate_limit;
mod router;
mod session;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use parley_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::presence::PresenceRegistry;
use crate::rate_limit::{EventRateLimiter, IpRateLimiter};
use crate::router::DeliveryRouter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug")),
        )
        .init();

    info!("Starting Parley server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    }
    .with_max_content_len(config.max_content_len);
    let store = router::open_store(db);

    let presence = PresenceRegistry::new();
    let delivery = DeliveryRouter::new(store, presence.clone());

    let http_limiter = IpRateLimiter::new(config.http_rate, config.http_burst);
    let event_limiter = EventRateLimiter::new(config.event_rate, config.event_burst);

    let app_state = AppState {
        router: delivery,
        http_limiter: http_limiter.clone(),
        event_limiter: event_limiter.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Every 5 minutes, evict buckets idle for more than 10 minutes
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            http_limiter.purge_stale(Duration::from_secs(600)).await;
            event_limiter.purge_stale(Duration::from_secs(600)).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP + WebSocket server until shutdown
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    presence.clear();

    Ok(())
}
