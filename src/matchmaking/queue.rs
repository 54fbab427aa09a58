//! Waiting-player queue.
//!
//! Holds players between `join_queue` and pairing. Order is arrival order;
//! re-queued players (failed creation, cancelled lobby) go back to the front
//! so they keep their waiting seniority.

use std::collections::VecDeque;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// A player waiting to be paired.
#[derive(Debug, Clone)]
pub struct WaitingPlayer {
    pub identity: String,
    /// Persisted score at enqueue time; pairing distance uses this.
    pub score: u32,
    /// When this player joined the queue.
    pub enqueued_at: Instant,
}

impl WaitingPlayer {
    pub fn new(identity: impl Into<String>, score: u32) -> Self {
        Self {
            identity: identity.into(),
            score,
            enqueued_at: Instant::now(),
        }
    }
}

/// Result of a join request.
#[derive(Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Player added at the back of the queue.
    Joined { position: usize },
    /// Player was already waiting; their original spot is kept.
    AlreadyQueued { position: usize },
}

/// FIFO of waiting players with atomic pair removal.
pub struct MatchQueue {
    waiting: Mutex<VecDeque<WaitingPlayer>>,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self {
            waiting: Mutex::new(VecDeque::new()),
        }
    }

    /// Add a player at the back. Joining twice keeps the original spot.
    pub async fn join(&self, identity: &str, score: u32) -> JoinOutcome {
        let mut waiting = self.waiting.lock().await;
        if let Some(position) = waiting.iter().position(|p| p.identity == identity) {
            return JoinOutcome::AlreadyQueued { position };
        }
        waiting.push_back(WaitingPlayer::new(identity, score));
        JoinOutcome::Joined {
            position: waiting.len() - 1,
        }
    }

    /// Remove a player. Returns false when they were not waiting.
    pub async fn leave(&self, identity: &str) -> bool {
        let mut waiting = self.waiting.lock().await;
        let before = waiting.len();
        waiting.retain(|p| p.identity != identity);
        waiting.len() < before
    }

    /// Put a player back at the front, keeping their original entry.
    pub async fn requeue(&self, player: WaitingPlayer) {
        let mut waiting = self.waiting.lock().await;
        if waiting.iter().any(|p| p.identity == player.identity) {
            return;
        }
        waiting.push_front(player);
    }

    /// Copy of the current queue for a pairing sweep.
    pub async fn snapshot(&self) -> Vec<WaitingPlayer> {
        self.waiting.lock().await.iter().cloned().collect()
    }

    /// Take both players out in one step. `None` when either has left since
    /// the snapshot was taken; in that case nothing is removed.
    pub async fn remove_pair(
        &self,
        first: &str,
        second: &str,
    ) -> Option<(WaitingPlayer, WaitingPlayer)> {
        let mut waiting = self.waiting.lock().await;
        let first_idx = waiting.iter().position(|p| p.identity == first)?;
        let second_idx = waiting.iter().position(|p| p.identity == second)?;
        if first_idx == second_idx {
            return None;
        }
        // Remove the later index first so the earlier one stays valid.
        let (hi, lo) = if first_idx > second_idx {
            (first_idx, second_idx)
        } else {
            (second_idx, first_idx)
        };
        let later = waiting.remove(hi)?;
        let earlier = waiting.remove(lo)?;
        if later.identity == first {
            Some((later, earlier))
        } else {
            Some((earlier, later))
        }
    }

    pub async fn contains(&self, identity: &str) -> bool {
        self.waiting
            .lock()
            .await
            .iter()
            .any(|p| p.identity == identity)
    }

    pub async fn len(&self) -> usize {
        self.waiting.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.waiting.lock().await.is_empty()
    }
}

impl Default for MatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
