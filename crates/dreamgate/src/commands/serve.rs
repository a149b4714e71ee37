//! HTTP server command implementation.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use dreamgate::background::BackgroundTasks;
use dreamgate::build_info;
use dreamgate::config::Config;
use dreamgate::server::{self, AppState};
use dreamgate::session::SessionRegistry;
use dreamgate::upstream::GrpcUpstream;

pub async fn run(
    config_path: &Path,
    host_override: Option<IpAddr>,
    port_override: Option<u16>,
) -> Result<()> {
    let mut config = Config::load(config_path)
        .await
        .with_context(|| format!("failed to load config '{}'", config_path.display()))?;

    // CLI overrides config
    if let Some(host) = host_override {
        config.server.host = host.to_string();
    }
    if let Some(port) = port_override {
        config.server.port = port;
    }

    let upstream = GrpcUpstream::connect_lazy(config.upstream.address.clone())?;
    info!(address = %upstream.address(), "Using capability service");

    let registry = SessionRegistry::new();
    let background_tasks = BackgroundTasks::new();
    let state = AppState {
        registry: registry.clone(),
        upstream: Arc::new(upstream),
        upstream_config: Arc::new(config.upstream.clone()),
        capacity: config.sessions.capacity(),
        user_id: Arc::from(config.user.id.as_str()),
        keep_alive_interval_seconds: config.server.keep_alive_interval_seconds,
        background_tasks: background_tasks.clone(),
    };

    if let Some(path) = &config.server.static_path {
        info!(path = %path.display(), "Serving static assets");
    }
    let app = server::build_app(
        state,
        config.server.request_timeout_seconds,
        config.server.static_path.as_deref(),
    );

    let ip: IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("invalid host '{}'", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(addr = %addr, version = %build_info::version_string(), "Starting server");
    server::serve(listener, app, registry, shutdown_signal()).await?;

    // Streams are gone; let in-flight memory publishes finish.
    background_tasks.shutdown().await;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
