//! In-memory score store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{DisconnectSettlement, MatchOutcome, ScoreResult, ScoreRules, ScoreStore};

/// DashMap-backed [`ScoreStore`]. Cheap to clone, shared across tasks.
#[derive(Debug, Clone, Default)]
pub struct MemoryScoreStore {
    scores: Arc<DashMap<String, u32>>,
    rules: ScoreRules,
}

impl MemoryScoreStore {
    #[must_use]
    pub fn new(rules: ScoreRules) -> Self {
        Self {
            scores: Arc::new(DashMap::new()),
            rules,
        }
    }

    /// Seed a persisted score directly. Used at startup and in tests.
    pub fn set_score(&self, identity: impl Into<String>, score: u32) {
        self.scores.insert(identity.into(), score);
    }

    fn credit(&self, identity: &str, amount: u32) {
        let mut entry = self.scores.entry(identity.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    fn debit(&self, identity: &str, amount: u32) {
        let mut entry = self.scores.entry(identity.to_string()).or_insert(0);
        *entry = entry.saturating_sub(amount);
    }
}

#[async_trait]
impl ScoreStore for MemoryScoreStore {
    async fn score(&self, identity: &str) -> ScoreResult<u32> {
        Ok(self.scores.get(identity).map(|s| *s).unwrap_or(0))
    }

    async fn apply_match_result(&self, outcome: &MatchOutcome) -> ScoreResult<()> {
        self.credit(
            &outcome.winner,
            outcome.winner_score.saturating_add(self.rules.win_bonus),
        );
        self.debit(&outcome.loser, self.rules.loss_penalty);
        Ok(())
    }

    async fn apply_disconnect(&self, settlement: &DisconnectSettlement) -> ScoreResult<()> {
        match settlement {
            DisconnectSettlement::Pvp { leaver, remainer } => {
                self.debit(leaver, self.rules.quit_penalty);
                self.credit(remainer, self.rules.quit_bonus);
            }
            DisconnectSettlement::BotWalkover { human, round_score } => {
                let credit = (*round_score)
                    .max(self.rules.bot_score_floor)
                    .saturating_add(self.rules.quit_bonus);
                self.credit(human, credit);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
