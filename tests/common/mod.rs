//! Common test utilities.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use rollduel::connection::ConnectionRegistry;
use rollduel::matchmaking::{MatchQueue, RecentMatches};
use rollduel::score::{MemoryScoreStore, ScoreStore};
use rollduel::server::{self, AppState, RuntimeServices};
use rollduel::session::{GameTimings, MatchDirectory, MatchService, Role, ServerEvent};

/// Shared collaborators a test drives matches through.
pub struct Harness {
    pub connections: ConnectionRegistry,
    pub queue: Arc<MatchQueue>,
    pub recent: RecentMatches,
    pub directory: MatchDirectory,
    pub store: MemoryScoreStore,
    pub service: MatchService,
}

/// Short countdowns so tests tick through phases quickly. The paused clock
/// makes the durations deterministic either way.
pub fn short_timings() -> GameTimings {
    GameTimings {
        lobby_secs: 5,
        preparation_secs: 2,
        turn_secs: 4,
        bot_think_secs: 1,
        settle_secs: 1,
        cleanup_secs: 1,
        max_rounds: 3,
    }
}

/// Create a test harness with sensible defaults.
pub fn harness() -> Harness {
    let connections = ConnectionRegistry::new();
    let queue = Arc::new(MatchQueue::new());
    let recent = RecentMatches::new();
    let directory = MatchDirectory::new();
    let store = MemoryScoreStore::default();
    let service = MatchService::new(
        directory.clone(),
        connections.clone(),
        queue.clone(),
        recent.clone(),
        Arc::new(store.clone()),
        short_timings(),
    );
    Harness {
        connections,
        queue,
        recent,
        directory,
        store,
        service,
    }
}

impl Harness {
    /// Attach a fake transport for `identity` and return its receiver.
    pub fn connect(&self, identity: &str) -> UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.register(identity, tx);
        rx
    }

    /// Build the HTTP app over this harness's services.
    pub fn app(&self) -> Router {
        let (shutdown_tx, _shutdown_rx) = server::shutdown_channel();
        let scores: Arc<dyn ScoreStore> = Arc::new(self.store.clone());
        let state = AppState {
            services: RuntimeServices {
                connections: self.connections.clone(),
                queue: self.queue.clone(),
                recent: self.recent.clone(),
                scores,
                matches: self.service.clone(),
            },
            admin_token: None,
            shutdown_tx: Arc::new(Mutex::new(Some(shutdown_tx))),
        };
        server::build_app(state, 5)
    }
}

/// Advance the paused clock one second at a time, yielding between steps so
/// actor tasks process each heartbeat before the next lands.
pub async fn tick_secs(n: u32) {
    // Let freshly spawned actor tasks run once so their heartbeats are armed
    // before the clock moves.
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    for _ in 0..n {
        tokio::time::advance(Duration::from_secs(1)).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }
}

/// Pull everything currently buffered on a fake transport.
pub fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// The identity seated as `role` in a match with players `(first, second)`.
pub fn identity_of(players: &(String, String), role: Role) -> String {
    match role {
        Role::First => players.0.clone(),
        Role::Second => players.1.clone(),
    }
}
