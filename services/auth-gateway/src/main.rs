//! Auth Gateway
//!
//! Single-binary service that:
//! 1. Loads config and secrets (admin key, session signing secret)
//! 2. Serves login/logout and guarded admin routes
//! 3. Authenticates by session cookie (same-origin) or bearer token (cross-origin)
//! 4. Optionally sweeps expired tokens on a timer

mod config;
mod metrics;
mod routes;
mod session;
mod sweeper;

use anyhow::{Context, Result};
use common::Secret;
use session_auth::{Authenticator, TokenStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::routes::{AppState, build_router};
use crate::session::SessionLayer;

/// Maximum time to wait for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting auth-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let mut config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        path_prefix = %config.server.path_prefix,
        token_ttl_hours = config.auth.token_ttl_hours,
        session_ttl_hours = config.auth.session_ttl_hours,
        sweep_interval_secs = config.auth.sweep_interval_secs,
        "configuration loaded"
    );

    let admin_key = config
        .auth
        .admin_key
        .take()
        .context("admin key missing after config load")?;

    let session_secret = match config.auth.session_secret.take() {
        Some(secret) => secret,
        None => {
            warn!("no session secret configured, generating one; sessions will not survive restart");
            Secret::new(session_auth::generate_secret())
        }
    };

    let store = Arc::new(TokenStore::new(config.auth.token_ttl()));
    let sessions = SessionLayer::new(
        session_secret,
        &config.auth.cookie_name,
        config.auth.session_ttl(),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let sweeper = config.auth.sweep_interval().map(|interval| {
        sweeper::spawn(store.clone(), sessions.clone(), interval, shutdown_rx)
    });

    let app_state = AppState {
        authenticator: Authenticator::new(store),
        admin_key: Arc::new(admin_key),
        sessions,
        path_prefix: config.server.path_prefix.clone(),
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: notify the server to drain, then race the drain against
    // the timeout.
    let mut drain_rx = shutdown_tx.subscribe();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = drain_rx.wait_for(|stop| *stop).await;
            })
            .await
    });

    shutdown_signal().await;

    // Stops both the server and the sweep task
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    if let Some(handle) = sweeper {
        let _ = handle.await;
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
