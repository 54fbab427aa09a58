//! Pair selection.
//!
//! `select_pair` is a pure function over a queue snapshot: it proposes the
//! eligible pair with the smallest persisted-score difference, or nothing.
//! Constraints (live sessions, the score-gap rule, rematch cooldown) are
//! injected as closures so the sweep and the tests share one code path.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::queue::WaitingPlayer;

// ============================================================================
// Rules
// ============================================================================

/// Constraints applied when proposing a pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingRules {
    /// Players at or above this persisted score never face beginners.
    #[serde(default = "default_high_score_threshold")]
    pub high_score_threshold: u32,
    /// Players below this persisted score count as beginners.
    #[serde(default = "default_low_score_threshold")]
    pub low_score_threshold: u32,
    /// How long a finished pairing blocks an immediate rematch.
    #[serde(default = "default_rematch_cooldown_secs")]
    pub rematch_cooldown_secs: u64,
}

fn default_high_score_threshold() -> u32 {
    1000
}

fn default_low_score_threshold() -> u32 {
    100
}

fn default_rematch_cooldown_secs() -> u64 {
    60
}

impl Default for PairingRules {
    fn default() -> Self {
        Self {
            high_score_threshold: default_high_score_threshold(),
            low_score_threshold: default_low_score_threshold(),
            rematch_cooldown_secs: default_rematch_cooldown_secs(),
        }
    }
}

impl PairingRules {
    pub fn rematch_cooldown(&self) -> Duration {
        Duration::from_secs(self.rematch_cooldown_secs)
    }

    /// The score-gap rule: veterans and beginners never meet.
    fn gap_blocked(&self, a: u32, b: u32) -> bool {
        (a >= self.high_score_threshold && b < self.low_score_threshold)
            || (b >= self.high_score_threshold && a < self.low_score_threshold)
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Propose the eligible pair with the smallest score difference.
///
/// Iteration follows queue order, so among equal differences the longest
/// waiting pair wins. Returns `None` when no eligible pair exists; an empty
/// or one-player queue is not an error.
pub fn select_pair(
    waiting: &[WaitingPlayer],
    rules: &PairingRules,
    mut is_blocked: impl FnMut(&str) -> bool,
    mut recently_played: impl FnMut(&str, &str) -> bool,
) -> Option<(String, String)> {
    let mut best: Option<(usize, usize, u32)> = None;

    for i in 0..waiting.len() {
        if is_blocked(&waiting[i].identity) {
            continue;
        }
        for j in (i + 1)..waiting.len() {
            if is_blocked(&waiting[j].identity) {
                continue;
            }
            if rules.gap_blocked(waiting[i].score, waiting[j].score) {
                continue;
            }
            if recently_played(&waiting[i].identity, &waiting[j].identity) {
                continue;
            }
            let diff = waiting[i].score.abs_diff(waiting[j].score);
            if best.is_none_or(|(_, _, best_diff)| diff < best_diff) {
                best = Some((i, j, diff));
            }
        }
    }

    best.map(|(i, j, _)| (waiting[i].identity.clone(), waiting[j].identity.clone()))
}

// ============================================================================
// Rematch Memory
// ============================================================================

/// Remembers which pairs finished a match recently.
///
/// Keys are identity pairs in sorted order, so `(a, b)` and `(b, a)` hit the
/// same entry. Cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct RecentMatches {
    finished: Arc<DashMap<(String, String), Instant>>,
}

impl RecentMatches {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    /// Record that `a` and `b` just finished a match.
    pub fn record(&self, a: &str, b: &str) {
        self.finished.insert(Self::key(a, b), Instant::now());
    }

    /// Whether the pair finished a match within `window`.
    pub fn played_within(&self, a: &str, b: &str, window: Duration) -> bool {
        self.finished
            .get(&Self::key(a, b))
            .is_some_and(|at| at.elapsed() < window)
    }

    /// Drop entries older than `window`.
    pub fn prune(&self, window: Duration) {
        self.finished.retain(|_, at| at.elapsed() < window);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn players(scores: &[(&str, u32)]) -> Vec<WaitingPlayer> {
        scores
            .iter()
            .map(|(id, score)| WaitingPlayer::new(*id, *score))
            .collect()
    }

    fn none_blocked(_: &str) -> bool {
        false
    }

    fn no_rematches(_: &str, _: &str) -> bool {
        false
    }

    #[test]
    fn picks_the_smallest_score_difference() {
        let waiting = players(&[("a", 100), ("b", 500), ("c", 120), ("d", 480)]);
        let pair = select_pair(&waiting, &PairingRules::default(), none_blocked, no_rematches);
        assert_eq!(pair, Some(("a".to_string(), "c".to_string())));
    }

    #[test]
    fn single_player_yields_nothing() {
        let waiting = players(&[("a", 100)]);
        assert_eq!(
            select_pair(&waiting, &PairingRules::default(), none_blocked, no_rematches),
            None
        );
    }

    #[test]
    fn players_in_live_sessions_are_skipped() {
        let waiting = players(&[("a", 100), ("b", 110), ("c", 400)]);
        let pair = select_pair(
            &waiting,
            &PairingRules::default(),
            |id| id == "b",
            no_rematches,
        );
        assert_eq!(pair, Some(("a".to_string(), "c".to_string())));
    }

    #[test]
    fn score_gap_rule_keeps_veterans_off_beginners() {
        let rules = PairingRules::default();
        let waiting = players(&[("veteran", 1200), ("beginner", 50)]);
        assert_eq!(
            select_pair(&waiting, &rules, none_blocked, no_rematches),
            None
        );

        // At or above the low threshold the pairing is allowed again.
        let waiting = players(&[("veteran", 1200), ("climber", 150)]);
        assert_eq!(
            select_pair(&waiting, &rules, none_blocked, no_rematches),
            Some(("veteran".to_string(), "climber".to_string()))
        );
    }

    #[test]
    fn recent_opponents_are_not_rematched() {
        let waiting = players(&[("a", 100), ("b", 105), ("c", 300)]);
        let pair = select_pair(
            &waiting,
            &PairingRules::default(),
            none_blocked,
            |x, y| (x, y) == ("a", "b") || (x, y) == ("b", "a"),
        );
        assert_eq!(pair, Some(("a".to_string(), "c".to_string())));
    }

    #[test]
    fn equal_differences_prefer_longer_waiters() {
        let waiting = players(&[("a", 100), ("b", 100), ("c", 100), ("d", 100)]);
        let pair = select_pair(&waiting, &PairingRules::default(), none_blocked, no_rematches);
        assert_eq!(pair, Some(("a".to_string(), "b".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn rematch_memory_expires_with_the_window() {
        let recent = RecentMatches::new();
        recent.record("a", "b");

        let window = Duration::from_secs(60);
        assert!(recent.played_within("a", "b", window));
        assert!(recent.played_within("b", "a", window));
        assert!(!recent.played_within("a", "c", window));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!recent.played_within("a", "b", window));

        recent.prune(window);
        assert!(recent.finished.is_empty());
    }
}
