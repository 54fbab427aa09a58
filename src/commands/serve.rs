//! HTTP server command implementation.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{info, warn};

use rollduel::config::Config;
use rollduel::connection::ConnectionRegistry;
use rollduel::matchmaking::{MatchQueue, Matchmaker, RecentMatches};
use rollduel::score::{MemoryScoreStore, ScoreStore};
use rollduel::server::{self, AppState, RuntimeServices};
use rollduel::session::{MatchDirectory, MatchService};

pub async fn run(
    config_path: &str,
    host_override: Option<IpAddr>,
    port_override: Option<u16>,
) -> Result<()> {
    let mut config = Config::load(config_path).await?;

    // CLI overrides config
    if let Some(host) = host_override {
        config.server.host = host.to_string();
    }
    if let Some(port) = port_override {
        config.server.port = port;
    }

    // Shared collaborators. Scores live in process memory; the trait keeps
    // the door open for an external system of record.
    let connections = ConnectionRegistry::new();
    let queue = Arc::new(MatchQueue::new());
    let recent = RecentMatches::new();
    let scores: Arc<dyn ScoreStore> = Arc::new(MemoryScoreStore::new(config.scoring.clone()));
    let directory = MatchDirectory::new();

    let matches = MatchService::new(
        directory.clone(),
        connections.clone(),
        queue.clone(),
        recent.clone(),
        scores.clone(),
        config.game.clone(),
    );

    let services = RuntimeServices {
        connections,
        queue: queue.clone(),
        recent: recent.clone(),
        scores,
        matches: matches.clone(),
    };

    // Pairing sweep stops on the same signal that stops the match actors.
    let matchmaker = Matchmaker::new(
        queue,
        recent,
        config.matchmaking.clone(),
        matches,
        services.connections.clone(),
    );
    let matchmaker_task = matchmaker.spawn(directory.subscribe_shutdown());

    // Create shutdown channel for HTTP-triggered shutdown
    let (shutdown_tx, shutdown_rx) = server::shutdown_channel();

    let state = AppState {
        services,
        admin_token: config.server.admin_token.clone(),
        shutdown_tx: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    let app = server::build_app(state, config.server.request_timeout_seconds);

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(addr = %addr, "Starting server");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_rx))
    .await?;

    // Stop the match actors, then the sweep that feeds them.
    directory.shutdown().await;
    let _ = matchmaker_task.await;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(http_shutdown: tokio::sync::oneshot::Receiver<()>) {
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
        _ = http_shutdown => info!("Received shutdown request via HTTP, shutting down..."),
    }
}
