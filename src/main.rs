//! Alto Viewer Server
//!
//! Backend for the document viewer: validates archive locators, proxies
//! page images and ALTO/PAGE XML, and serves the view's chunked calls.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use alto_viewer::config::Config;
use alto_viewer::routes;
use alto_viewer::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "alto_viewer=debug,alto_viewer_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Alto Viewer Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Allowed upstream hosts: {}", config.proxy.allowed_hosts.join(", "));
    tracing::info!(
        "Cache: idle {:?}, lifetime {:?}, max entry {} bytes",
        config.proxy.cache_idle,
        config.proxy.cache_lifetime,
        config.proxy.max_cache_entry_bytes
    );

    let app_state = AppState::new(config.clone()).context("Failed to initialize proxy")?;

    // Sweep expired cache entries so idle bodies don't linger until the next read
    let sweep_period = config.proxy.cache_idle.min(Duration::from_secs(5)).max(Duration::from_secs(1));
    let sweeper = app_state.cache().clone().start_sweeper(sweep_period);

    let app = routes::app(app_state);

    // Start server with graceful shutdown
    let ip: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid SERVER_HOST: {}", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);
    tracing::info!("Alto Viewer Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
