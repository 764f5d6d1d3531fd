//! # safelink-server
//!
//! Emergency alert server for the SafeLink personal-safety platform.
//!
//! This binary provides:
//! - **REST API** (axum) to trigger, track and close emergency alerts, manage
//!   trusted contacts and file community reports
//! - **WebSocket subscription channel** that pushes alert events to the
//!   owner, to responders and to anyone watching a single alert
//! - **Fan-out** of every new alert to the owner's trusted contacts over
//!   push, SMS or USSD gateways, with bounded concurrency and per-dispatch
//!   timeouts
//! - **Durable storage** in SQLite

mod api;
mod auth;
mod config;
mod error;
mod fanout;
mod notify;
mod realtime;
mod service;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use safelink_store::SqliteStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::auth::SessionVerifier;
use crate::config::ServerConfig;
use crate::fanout::FanOutCoordinator;
use crate::notify::Dispatcher;
use crate::realtime::RoomBroadcaster;
use crate::service::EmergencyService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,safelink_server=debug")),
        )
        .init();

    info!("Starting SafeLink server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Durable store (creates the database file and runs migrations)
    let store = Arc::new(SqliteStore::open(&config.database_path)?);
    info!(path = %config.database_path.display(), "Database opened");

    let broadcaster = Arc::new(RoomBroadcaster::new(config.broadcast_capacity));

    let http = reqwest::Client::builder()
        .timeout(config.dispatch_timeout)
        .build()?;
    let dispatcher = Arc::new(Dispatcher::from_config(&config, http));

    let fanout = Arc::new(FanOutCoordinator::new(
        store.clone(),
        dispatcher,
        config.fanout_max_concurrency,
        config.dispatch_timeout,
    ));

    let service = Arc::new(EmergencyService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        broadcaster.clone(),
        fanout,
    ));

    // Session verifier with the token issuer's public key
    let verifier = Arc::new(SessionVerifier::new(config.auth_pubkey));

    let app_state = AppState {
        service,
        verifier,
        broadcaster,
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic session cache cleanup (every 10 minutes)
    let sv = app_state.verifier.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(600));
        loop {
            interval.tick().await;
            sv.purge_expired().await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server until it fails or Ctrl+C arrives
    // -----------------------------------------------------------------------
    let served = tokio::select! {
        result = api::serve(app_state, config.http_addr) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    };

    if let Err(e) = &served {
        tracing::error!(error = %e, "HTTP server failed");
    }

    match store.close().await {
        Ok(()) => info!("Database closed"),
        Err(e) => tracing::warn!(error = %e, "Database did not close cleanly"),
    }

    served
}
