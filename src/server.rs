use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tokio::sync::{Mutex, oneshot};
use tower_http::timeout::TimeoutLayer;

use crate::connection::ConnectionRegistry;
use crate::handlers;
use crate::matchmaking::{MatchQueue, RecentMatches};
use crate::score::ScoreStore;
use crate::session::MatchService;

// ============================================================================
// Runtime Services
// ============================================================================

/// Shared runtime services used across the socket handlers and the matchmaker.
#[derive(Clone)]
pub struct RuntimeServices {
    pub connections: ConnectionRegistry,
    pub queue: Arc<MatchQueue>,
    pub recent: RecentMatches,
    pub scores: Arc<dyn ScoreStore>,
    pub matches: MatchService,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub services: RuntimeServices,
    pub admin_token: Option<String>,
    pub shutdown_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

// ============================================================================
// Server Setup
// ============================================================================

/// Create a shutdown channel pair.
///
/// Returns (sender for AppState, receiver for shutdown_signal).
pub fn shutdown_channel() -> (oneshot::Sender<()>, oneshot::Receiver<()>) {
    oneshot::channel()
}

pub fn build_app(state: AppState, request_timeout_seconds: u64) -> Router {
    // Game socket - no request timeout (connections are long-lived)
    let socket_routes = Router::new()
        .route("/ws", get(handlers::ws_connect))
        .with_state(state.clone());

    // Status routes - with request timeout
    let status_routes = Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/version", get(handlers::version))
        .with_state(state.clone())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_seconds),
        ));

    // Admin routes (no timeout, state required for shutdown)
    let admin_routes = Router::new()
        .route("/shutdown", post(handlers::shutdown))
        .with_state(state);

    Router::new()
        .merge(socket_routes)
        .merge(status_routes)
        .nest("/api/admin/v1", admin_routes)
}
