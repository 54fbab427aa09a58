//! Persisted-score boundary.
//!
//! The match server never mutates persisted scores directly; every change
//! goes through the [`ScoreStore`] trait so the system of record can live
//! outside this process. The in-memory implementation backs the server
//! binary and the tests.

mod memory;

pub use memory::MemoryScoreStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Errors from score persistence.
#[derive(Debug, Error)]
pub enum ScoreError {
    /// The system of record could not be reached.
    #[error("score store unavailable: {0}")]
    Unavailable(String),
}

pub type ScoreResult<T> = Result<T, ScoreError>;

// ============================================================================
// Economy Rules
// ============================================================================

/// Economy knobs applied when settling matches and walkovers.
///
/// Persisted scores are clamped at zero; no rule may drive one negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRules {
    /// Added to the winner's persisted score on top of the match score.
    #[serde(default = "default_win_bonus")]
    pub win_bonus: u32,
    /// Deducted from the loser's persisted score.
    #[serde(default = "default_loss_penalty")]
    pub loss_penalty: u32,
    /// Deducted from a player that abandons a two-human match.
    #[serde(default = "default_quit_penalty")]
    pub quit_penalty: u32,
    /// Credited to the player left behind by a disconnect.
    #[serde(default = "default_quit_bonus")]
    pub quit_bonus: u32,
    /// Minimum round credit when a bot opponent drops out.
    #[serde(default = "default_bot_score_floor")]
    pub bot_score_floor: u32,
}

fn default_win_bonus() -> u32 {
    10
}

fn default_loss_penalty() -> u32 {
    5
}

fn default_quit_penalty() -> u32 {
    15
}

fn default_quit_bonus() -> u32 {
    10
}

fn default_bot_score_floor() -> u32 {
    10
}

impl Default for ScoreRules {
    fn default() -> Self {
        Self {
            win_bonus: default_win_bonus(),
            loss_penalty: default_loss_penalty(),
            quit_penalty: default_quit_penalty(),
            quit_bonus: default_quit_bonus(),
            bot_score_floor: default_bot_score_floor(),
        }
    }
}

// ============================================================================
// Settlement Types
// ============================================================================

/// A decided match handed to the store. Draws never reach the store.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub winner: String,
    pub loser: String,
    pub winner_score: u32,
    pub loser_score: u32,
}

/// A walkover caused by a disconnect or abandonment.
#[derive(Debug, Clone)]
pub enum DisconnectSettlement {
    /// Two humans: the leaver pays the quit penalty, the one left behind
    /// gains the quit bonus. Match scores play no part.
    Pvp { leaver: String, remainer: String },
    /// Bot match: the remaining human is credited the larger of their round
    /// score and the floor, plus the quit bonus. The bot side carries no
    /// persisted score to debit.
    BotWalkover { human: String, round_score: u32 },
}

// ============================================================================
// Store Trait
// ============================================================================

/// System of record for persisted player scores.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Current persisted score. Unknown identities read as zero.
    async fn score(&self, identity: &str) -> ScoreResult<u32>;

    /// Settle a decided match per the economy rules.
    async fn apply_match_result(&self, outcome: &MatchOutcome) -> ScoreResult<()>;

    /// Settle a walkover per the economy rules.
    async fn apply_disconnect(&self, settlement: &DisconnectSettlement) -> ScoreResult<()>;
}
