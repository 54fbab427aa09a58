//! Match actor types and protocol.
//!
//! Defines the command protocol for communicating with match actors, along
//! with countdown, configuration, and error types.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::connection::ConnectionRegistry;
use crate::matchmaking::{MatchQueue, RecentMatches};
use crate::score::ScoreStore;

use super::directory::MatchDirectory;
use super::events::{StateSnapshot, TimerKind};
use super::game::{GameError, MatchKind, Phase, Role, SeatSpec};

// ============================================================================
// Match Command
// ============================================================================

/// Commands that can be sent to a match actor.
pub enum MatchCommand {
    SubmitMove {
        identity: String,
        slot: u8,
        revealed_value: Option<u8>,
        combination: Option<Vec<u8>>,
        reply: oneshot::Sender<Result<(), ActionError>>,
    },
    SubmitSwap {
        identity: String,
        pos_a: usize,
        pos_b: usize,
        combination: Option<Vec<u8>>,
        reply: oneshot::Sender<Result<(), ActionError>>,
    },
    SubmitEmoji {
        identity: String,
        emoji_index: u8,
        reply: oneshot::Sender<Result<(), ActionError>>,
    },
    ReportDisconnect {
        identity: String,
        reply: oneshot::Sender<Result<(), ActionError>>,
    },
    CancelLobby {
        identity: String,
        reply: oneshot::Sender<Result<(), ActionError>>,
    },

    // Read operations
    GetSnapshot {
        identity: String,
        reply: oneshot::Sender<Result<StateSnapshot, ActionError>>,
    },
    GetMetadata {
        reply: oneshot::Sender<MatchMetadata>,
    },
}

// ============================================================================
// Error Types
// ============================================================================

/// Why a submitted action was refused. The display string is the `reason`
/// clients receive in a `rejected` event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    /// The match actor has shut down.
    #[error("match no longer exists")]
    Shutdown,

    /// A game rule refused the action.
    #[error(transparent)]
    Rule(#[from] GameError),

    /// Lobby cancellation requested after the match left the lobby.
    #[error("already started")]
    AlreadyStarted,
}

// ============================================================================
// Countdown
// ============================================================================

/// The single countdown slot of a match actor.
///
/// At most one countdown is live per match. Arming a new one replaces the
/// slot and bumps the generation, so anything captured against the old
/// generation is stale and must be ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub kind: TimerKind,
    pub remaining: u32,
    pub generation: u64,
}

// ============================================================================
// Metadata
// ============================================================================

/// Point-in-time description of a match (returned by GetMetadata).
#[derive(Debug, Clone)]
pub struct MatchMetadata {
    pub id: String,
    pub kind: MatchKind,
    pub phase: Phase,
    pub round: u32,
    pub turn: Option<Role>,
    pub players: (String, String),
    pub scores: (u32, u32),
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Timings
// ============================================================================

/// Countdown durations and round count, all in whole seconds to match the
/// one-second tick the actor runs on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameTimings {
    #[serde(default = "default_lobby_secs")]
    pub lobby_secs: u32,
    #[serde(default = "default_preparation_secs")]
    pub preparation_secs: u32,
    #[serde(default = "default_turn_secs")]
    pub turn_secs: u32,
    #[serde(default = "default_bot_think_secs")]
    pub bot_think_secs: u32,
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u32,
    #[serde(default = "default_cleanup_secs")]
    pub cleanup_secs: u32,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

fn default_lobby_secs() -> u32 {
    30
}

fn default_preparation_secs() -> u32 {
    30
}

fn default_turn_secs() -> u32 {
    30
}

fn default_bot_think_secs() -> u32 {
    2
}

fn default_settle_secs() -> u32 {
    2
}

fn default_cleanup_secs() -> u32 {
    5
}

fn default_max_rounds() -> u32 {
    3
}

impl Default for GameTimings {
    fn default() -> Self {
        Self {
            lobby_secs: default_lobby_secs(),
            preparation_secs: default_preparation_secs(),
            turn_secs: default_turn_secs(),
            bot_think_secs: default_bot_think_secs(),
            settle_secs: default_settle_secs(),
            cleanup_secs: default_cleanup_secs(),
            max_rounds: default_max_rounds(),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Everything needed to spawn a match actor.
pub struct ActorConfig {
    pub id: String,
    pub first: SeatSpec,
    pub second: SeatSpec,
    pub timings: GameTimings,
    pub connections: ConnectionRegistry,
    pub scores: Arc<dyn ScoreStore>,
    pub directory: MatchDirectory,
    pub queue: Arc<MatchQueue>,
    pub recent: RecentMatches,
}

// ============================================================================
// Constants
// ============================================================================

/// Channel capacity for commands.
///
/// Two players and the matchmaker are the only senders; bursts are tiny.
pub const CHANNEL_CAPACITY: usize = 64;

/// The actor's heartbeat. Every countdown decrements on this cadence and the
/// lobby readiness check runs on it.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
