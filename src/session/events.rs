//! Wire protocol for the game socket.
//!
//! Server-to-client messages are `ServerEvent` values serialized as JSON with
//! a `type` tag; client-to-server messages are `ClientAction` values with an
//! `action` tag. Event kinds are part of the protocol and must not be
//! renamed.

use serde::{Deserialize, Serialize};

use super::game::{GameState, MatchKind, Phase, Role, SLOTS_PER_ROUND};

// ============================================================================
// Countdown Kinds
// ============================================================================

/// Which countdown a `timer_update` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    Lobby,
    Preparation,
    Turn,
    BotThink,
    Settle,
    Cleanup,
}

impl TimerKind {
    /// Only the countdowns players act under are echoed to clients.
    pub fn is_broadcast(self) -> bool {
        matches!(self, TimerKind::Preparation | TimerKind::Turn)
    }
}

// ============================================================================
// Snapshot Types
// ============================================================================

/// Both in-match scores, keyed by seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorePair {
    pub first: u32,
    pub second: u32,
}

impl ScorePair {
    pub fn from_state(state: &GameState) -> Self {
        let (first, second) = state.scores();
        Self { first, second }
    }

    pub fn get(&self, role: Role) -> u32 {
        match role {
            Role::First => self.first,
            Role::Second => self.second,
        }
    }
}

/// One revealed entry of the opponent's arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedSlot {
    pub slot: u8,
    pub value: u8,
}

/// Per-recipient view of a match, sent as the `game_state` payload.
///
/// Each player sees their own arrangement and remaining slots, plus the
/// opponent values their own picks have already revealed. The opponent's
/// unrevealed values never cross the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub match_id: String,
    pub kind: MatchKind,
    pub phase: Phase,
    pub round: u32,
    pub max_rounds: u32,
    pub you: Role,
    pub opponent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combination: Option<Vec<u8>>,
    pub remaining_slots: Vec<u8>,
    pub revealed: Vec<RevealedSlot>,
    pub scores: ScorePair,
    pub selections: u8,
    pub turn: Option<Role>,
}

impl StateSnapshot {
    pub fn for_role(match_id: &str, state: &GameState, you: Role) -> Self {
        let seat = state.seat(you);
        let opponent = state.seat(you.opponent());
        let revealed = opponent
            .combination
            .map(|values| {
                (1..=SLOTS_PER_ROUND)
                    .filter(|slot| !seat.slots.contains(slot))
                    .map(|slot| RevealedSlot {
                        slot,
                        value: values[usize::from(slot - 1)],
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            match_id: match_id.to_string(),
            kind: state.kind(),
            phase: state.phase(),
            round: state.round(),
            max_rounds: state.max_rounds(),
            you,
            opponent: opponent.identity.clone(),
            combination: seat.combination.map(|values| values.to_vec()),
            remaining_slots: seat.slots.iter().copied().collect(),
            revealed,
            scores: ScorePair::from_state(state),
            selections: state.selections(),
            turn: state.turn(),
        }
    }
}

/// How a `move_made` affects the recipient's board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveAction {
    /// An opponent value became visible to the recipient.
    Reveal,
    /// One of the recipient's own dice was taken.
    Removal,
}

// ============================================================================
// Server Events
// ============================================================================

/// Server-to-client messages. The `type` tag is the protocol event kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The lobby never became a match.
    MatchCancelled { reason: String },
    /// Both seats are reachable and the match is starting.
    GameStart {
        match_id: String,
        you: Role,
        opponent: String,
        kind: MatchKind,
    },
    /// Full per-recipient snapshot.
    GameState { state: StateSnapshot },
    /// One second of a live countdown elapsed.
    TimerUpdate { kind: TimerKind, remaining: u32 },
    /// The session moved to a new phase.
    PhaseChange { phase: Phase, round: u32 },
    /// The turn holder changed.
    TurnChange { role: Role, round: u32 },
    /// A slot was consumed. The acting player's copy carries the revealed
    /// value; the opponent's copy describes the removal of their own die.
    MoveMade {
        role: Role,
        slot: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revealed: Option<u8>,
        score: u32,
        action: MoveAction,
        target: Role,
    },
    /// The turn countdown expired and the server picked a slot.
    AutoMoveNotification { role: Role, slot: u8 },
    /// Acknowledges a swap, sent to the acting player only.
    DiceSwapped {
        pos_a: usize,
        pos_b: usize,
        combination: Vec<u8>,
    },
    /// Relayed to the opponent only.
    EmojiUsed { role: Role, emoji_index: u8 },
    /// The other seat disconnected or abandoned the match.
    OpponentLeft { reason: String },
    /// A round finished. Scores are cumulative across rounds.
    #[serde(rename = "manche_end")]
    RoundEnd { round: u32, scores: ScorePair },
    /// The match is over. `winner` is `None` on a draw.
    GameEnd {
        scores: ScorePair,
        winner: Option<Role>,
    },
    /// Waiting-queue acknowledgements.
    QueueJoined { position: usize },
    QueueLeft,
    /// A submitted action was refused. No state changed.
    Rejected { reason: String },
}

// ============================================================================
// Client Actions
// ============================================================================

/// Client-to-server messages on the game socket. The sender's identity comes
/// from the socket itself, never from the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    JoinQueue,
    LeaveQueue,
    PlayBot,
    SubmitMove {
        slot: u8,
        /// Client's guess at the value it will reveal. Advisory only.
        #[serde(default)]
        revealed_value: Option<u8>,
        /// Full arrangement to commit before the move applies.
        #[serde(default)]
        combination: Option<Vec<u8>>,
    },
    SubmitSwap {
        pos_a: usize,
        pos_b: usize,
        #[serde(default)]
        combination: Option<Vec<u8>>,
    },
    SubmitEmoji { emoji_index: u8 },
    CancelLobby,
    ReportDisconnect,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::game::SeatSpec;

    #[test]
    fn round_end_serializes_as_manche_end() {
        let event = ServerEvent::RoundEnd {
            round: 2,
            scores: ScorePair {
                first: 14,
                second: 9,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"manche_end\""));
        assert!(json.contains("\"first\":14"));
    }

    #[test]
    fn move_made_omits_revealed_on_removal_copy() {
        let event = ServerEvent::MoveMade {
            role: Role::First,
            slot: 4,
            revealed: None,
            score: 11,
            action: MoveAction::Removal,
            target: Role::Second,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"move_made\""));
        assert!(json.contains("\"action\":\"removal\""));
        assert!(!json.contains("revealed"));
    }

    #[test]
    fn auto_move_uses_the_notification_kind() {
        let event = ServerEvent::AutoMoveNotification {
            role: Role::Second,
            slot: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"auto_move_notification\""));
    }

    #[test]
    fn game_end_keeps_winner_field_on_draw() {
        let event = ServerEvent::GameEnd {
            scores: ScorePair {
                first: 20,
                second: 20,
            },
            winner: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"winner\":null"));
    }

    #[test]
    fn client_action_parses_with_optional_hints() {
        let action: ClientAction =
            serde_json::from_str(r#"{"action":"submit_move","slot":3}"#).unwrap();
        match action {
            ClientAction::SubmitMove {
                slot,
                revealed_value,
                combination,
            } => {
                assert_eq!(slot, 3);
                assert!(revealed_value.is_none());
                assert!(combination.is_none());
            }
            _ => panic!("wrong action"),
        }
    }

    #[test]
    fn snapshot_hides_unrevealed_opponent_values() {
        let mut state = GameState::new(SeatSpec::human("alice"), SeatSpec::human("bob"), 3);
        state
            .commit_combination(Role::First, &[1, 2, 3, 4, 5, 6])
            .unwrap();
        state
            .commit_combination(Role::Second, &[6, 5, 4, 3, 2, 1])
            .unwrap();
        let mut rng = rand::rng();
        state.start_play(&mut rng);
        let actor = state.turn().unwrap();
        state.apply_move(actor, 2).unwrap();

        let snapshot = StateSnapshot::for_role("match_x", &state, actor);
        assert_eq!(snapshot.revealed.len(), 1);
        assert_eq!(snapshot.revealed[0].slot, 2);
        assert_eq!(snapshot.remaining_slots.len(), 5);

        let other = StateSnapshot::for_role("match_x", &state, actor.opponent());
        assert!(other.revealed.is_empty());
        assert_eq!(other.remaining_slots.len(), 6);
        assert_eq!(other.scores, snapshot.scores);
    }
}
