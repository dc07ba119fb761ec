//! HTTP server command implementation.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chatgate::config::{self, Config};
use chatgate::connection::{ConnectionManager, ReconnectPolicy};
use chatgate::credentials::FileCredentialStore;
use chatgate::dedup::DedupCache;
use chatgate::sender::{SendGateway, SendPolicy};
use chatgate::server::{self, AppState};
use chatgate::transport::SubprocessTransport;

pub async fn run(
    config_path: &str,
    host_override: Option<IpAddr>,
    port_override: Option<u16>,
) -> Result<()> {
    let mut config = Config::load(config_path)
        .await
        .with_context(|| format!("failed to load config '{config_path}'"))?;

    // CLI overrides config
    if let Some(host) = host_override {
        config.server.host = host.to_string();
    }
    if let Some(port) = port_override {
        config.server.port = port;
    }

    let credentials = Arc::new(FileCredentialStore::new(config::resolve_path(
        Path::new(config_path),
        &config.connection.credentials_path,
    )));
    info!(path = %credentials.path().display(), "Using credential store");

    let transport = Arc::new(SubprocessTransport::new(
        config.connection.bridge.clone(),
        config.connection.send_timeout(),
    ));

    let connection = ConnectionManager::new(
        transport,
        credentials,
        ReconnectPolicy {
            max_retries: config.connection.max_retries,
            retry_delay: config.connection.retry_delay(),
        },
    );

    let dedup = DedupCache::new(config.dedup.window());
    let sweeper_cancel = CancellationToken::new();
    let sweeper = dedup.spawn_sweeper(config.dedup.sweep_interval(), sweeper_cancel.clone());

    let sender = SendGateway::new(
        connection.clone(),
        dedup.clone(),
        SendPolicy {
            attempts: config.sender.attempts,
            retry_delay: config.sender.retry_delay(),
            default_domain: config.sender.default_domain.clone(),
        },
    );

    let state = AppState::new(sender);
    let app = server::build_app(state, config.server.request_timeout_seconds);

    let ip: IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("invalid host '{}'", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    connection.start().await;

    info!(addr = %addr, "Starting server");
    let teardown = async {
        let cleared = dedup.clear();
        info!(cleared, "Duplicate cache cleared");

        sweeper_cancel.cancel();
        if let Err(e) = sweeper.await {
            warn!(error = %e, "Dedup sweeper task failed");
        }

        connection.shutdown().await;
    };
    server::serve_until(listener, app, shutdown_signal(), teardown).await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
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
                std::future::pending::<()>().await;
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
