//! Periodic pairing sweep.
//!
//! A single background task wakes once per second, asks the selector for the
//! best-matched waiting pair, and hands it to the match service. Creation
//! failures put the unowned identities straight back into the queue, so a
//! lost race with another flow costs nobody their place.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info};

use crate::connection::ConnectionRegistry;
use crate::session::MatchService;

use super::pairing::{PairingRules, RecentMatches, select_pair};
use super::queue::MatchQueue;

/// How often the sweep looks for new pairs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Background task that drains the queue into new matches.
pub struct Matchmaker {
    queue: Arc<MatchQueue>,
    recent: RecentMatches,
    rules: PairingRules,
    sessions: MatchService,
    connections: ConnectionRegistry,
}

impl Matchmaker {
    pub fn new(
        queue: Arc<MatchQueue>,
        recent: RecentMatches,
        rules: PairingRules,
        sessions: MatchService,
        connections: ConnectionRegistry,
    ) -> Self {
        Self {
            queue,
            recent,
            rules,
            sessions,
            connections,
        }
    }

    /// Spawn the sweep loop. Runs until the shutdown signal flips.
    pub fn spawn(self, mut shutdown_rx: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + SWEEP_INTERVAL, SWEEP_INTERVAL);
            info!("Matchmaker started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }
            info!("Matchmaker stopped");
        })
    }

    /// One pass: pair as many eligible waiters as the queue holds right now.
    /// Stops at the first creation failure; the next tick retries.
    pub async fn sweep(&self) {
        self.recent.prune(self.rules.rematch_cooldown());

        loop {
            let waiting = self.queue.snapshot().await;
            if waiting.len() < 2 {
                return;
            }

            let directory = self.sessions.directory();
            let proposal = select_pair(
                &waiting,
                &self.rules,
                |identity| {
                    directory.is_owned(identity) || !self.connections.is_reachable(identity)
                },
                |a, b| self.recent.played_within(a, b, self.rules.rematch_cooldown()),
            );
            let Some((first, second)) = proposal else {
                return;
            };

            // Whoever left between the snapshot and now simply drops the
            // proposal; the loop re-reads the queue.
            if self.queue.remove_pair(&first, &second).await.is_none() {
                continue;
            }

            match self.sessions.create_session(&first, &second).await {
                Ok(handle) => {
                    debug!(match_id = %handle.id(), %first, %second, "Paired players");
                }
                Err(e) => {
                    debug!(%first, %second, error = %e, "Pairing attempt failed");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::score::MemoryScoreStore;
    use crate::session::{GameTimings, MatchDirectory, ServerEvent};

    struct Fixture {
        matchmaker: Matchmaker,
        queue: Arc<MatchQueue>,
        connections: ConnectionRegistry,
        directory: MatchDirectory,
    }

    fn setup_matchmaker() -> Fixture {
        let connections = ConnectionRegistry::new();
        let queue = Arc::new(MatchQueue::new());
        let recent = RecentMatches::new();
        let directory = MatchDirectory::new();
        let sessions = MatchService::new(
            directory.clone(),
            connections.clone(),
            queue.clone(),
            recent.clone(),
            Arc::new(MemoryScoreStore::default()),
            GameTimings::default(),
        );
        let matchmaker = Matchmaker::new(
            queue.clone(),
            recent,
            PairingRules::default(),
            sessions,
            connections.clone(),
        );
        Fixture {
            matchmaker,
            queue,
            connections,
            directory,
        }
    }

    fn connect(fixture: &Fixture, identity: &str) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        fixture.connections.register(identity, tx);
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_pairs_two_connected_players() {
        let fixture = setup_matchmaker();
        let _alice = connect(&fixture, "alice");
        let _bob = connect(&fixture, "bob");
        fixture.queue.join("alice", 50).await;
        fixture.queue.join("bob", 60).await;

        fixture.matchmaker.sweep().await;

        assert_eq!(fixture.directory.len(), 1);
        assert!(fixture.directory.is_owned("alice"));
        assert!(fixture.directory.is_owned("bob"));
        assert!(fixture.queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_skips_disconnected_waiters() {
        let fixture = setup_matchmaker();
        let _alice = connect(&fixture, "alice");
        fixture.queue.join("alice", 50).await;
        fixture.queue.join("bob", 60).await;

        fixture.matchmaker.sweep().await;

        assert!(fixture.directory.is_empty());
        assert!(fixture.queue.contains("alice").await);
        assert!(fixture.queue.contains("bob").await);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_pairs_closest_scores_first() {
        let fixture = setup_matchmaker();
        let mut receivers = Vec::new();
        for identity in ["p40", "p50", "p55", "p300"] {
            receivers.push(connect(&fixture, identity));
        }
        fixture.queue.join("p40", 40).await;
        fixture.queue.join("p50", 50).await;
        fixture.queue.join("p55", 55).await;
        fixture.queue.join("p300", 300).await;

        fixture.matchmaker.sweep().await;

        // p50 and p55 are the tightest pair, then p40 joins p300.
        let p50_match = fixture.directory.find_by_identity("p50").unwrap();
        let p55_match = fixture.directory.find_by_identity("p55").unwrap();
        assert_eq!(p50_match.id(), p55_match.id());
        assert_eq!(fixture.directory.len(), 2);
        assert!(fixture.queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_leaves_lone_waiter_in_queue() {
        let fixture = setup_matchmaker();
        let _alice = connect(&fixture, "alice");
        fixture.queue.join("alice", 50).await;

        fixture.matchmaker.sweep().await;

        assert!(fixture.directory.is_empty());
        assert!(fixture.queue.contains("alice").await);
    }
}
