//! Pure match state for the two-player dice duel.
//!
//! All game rules live here with no I/O and no channels. The session actor
//! owns one `GameState` and drives it from its command loop; everything
//! observable on the wire is derived from this struct.

use std::collections::BTreeSet;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Slots (and combination length) per round.
pub const SLOTS_PER_ROUND: u8 = 6;

/// Highest value accepted in a client-committed combination entry.
pub const MAX_COMBINATION_VALUE: u8 = 9;

/// Die faces used when the server fills a combination itself.
pub const DIE_FACES: u8 = 6;

// ============================================================================
// Roles and Phases
// ============================================================================

/// The two fixed seats of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    First,
    Second,
}

impl Role {
    /// The other seat.
    #[must_use]
    pub fn opponent(self) -> Role {
        match self {
            Role::First => Role::Second,
            Role::Second => Role::First,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::First => "first",
            Role::Second => "second",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Role::First => 0,
            Role::Second => 1,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a seat is driven by a connected client or by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatKind {
    Human,
    Bot,
}

impl SeatKind {
    pub fn is_bot(self) -> bool {
        matches!(self, SeatKind::Bot)
    }
}

/// Match composition, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Pvp,
    Bot,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Pvp => "pvp",
            MatchKind::Bot => "bot",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phase of a match session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Lobby,
    Preparing,
    Playing,
    Ended,
    Cancelled,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Lobby => "lobby",
            Phase::Preparing => "preparing",
            Phase::Playing => "playing",
            Phase::Ended => "ended",
            Phase::Cancelled => "cancelled",
        }
    }

    /// Terminal phases accept no further game actions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Ended | Phase::Cancelled)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Rule violations raised by state mutations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GameError {
    /// Action submitted outside the phase that allows it.
    #[error("action not allowed while {0}")]
    WrongPhase(Phase),

    /// Move submitted by the seat that does not hold the turn.
    #[error("not your turn")]
    OutOfTurn,

    /// Slot already consumed this round or outside 1..=6.
    #[error("slot {0} is not available")]
    SlotUnavailable(u8),

    /// Identity does not belong to either seat.
    #[error("unknown participant: {0}")]
    UnknownParticipant(String),

    /// Combination rejected during commit.
    #[error("combination must be exactly 6 values between 1 and 9")]
    InvalidCombination,

    /// A move was applied before the opponent combination existed.
    #[error("combination for {0} has not been committed")]
    CombinationMissing(Role),
}

// ============================================================================
// Seats
// ============================================================================

/// Identity and kind for one seat, supplied at creation.
#[derive(Debug, Clone)]
pub struct SeatSpec {
    pub identity: String,
    pub kind: SeatKind,
}

impl SeatSpec {
    pub fn human(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            kind: SeatKind::Human,
        }
    }

    pub fn bot(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            kind: SeatKind::Bot,
        }
    }
}

/// One of the two seats of a match.
#[derive(Debug, Clone)]
pub struct Seat {
    pub identity: String,
    pub role: Role,
    pub kind: SeatKind,
    /// Hidden arrangement for the current round. `None` until committed.
    pub combination: Option<[u8; SLOTS_PER_ROUND as usize]>,
    /// Slots still selectable this round, always a subset of 1..=6.
    pub slots: BTreeSet<u8>,
    /// Cumulative in-match score. Only ever grows.
    pub score: u32,
}

impl Seat {
    fn new(spec: SeatSpec, role: Role) -> Self {
        Self {
            identity: spec.identity,
            role,
            kind: spec.kind,
            combination: None,
            slots: full_slot_set(),
            score: 0,
        }
    }
}

fn full_slot_set() -> BTreeSet<u8> {
    (1..=SLOTS_PER_ROUND).collect()
}

// ============================================================================
// Move Outcome
// ============================================================================

/// Result of a committed slot pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub slot: u8,
    /// Value revealed from the opponent's combination at that slot.
    pub revealed: u8,
    /// Acting seat's score after the reveal was added.
    pub actor_score: u32,
    /// Picks committed so far this round, including this one.
    pub selections: u8,
    /// True when this pick was the sixth of the round.
    pub round_complete: bool,
}

// ============================================================================
// Game State
// ============================================================================

/// Full state of one match. Exactly two seats, never more, never fewer.
#[derive(Debug)]
pub struct GameState {
    kind: MatchKind,
    phase: Phase,
    round: u32,
    max_rounds: u32,
    turn: Option<Role>,
    seats: [Seat; 2],
    auto_move_used: [bool; 2],
    selections: u8,
}

impl GameState {
    /// Build a fresh match in the lobby phase, round 1.
    #[must_use]
    pub fn new(first: SeatSpec, second: SeatSpec, max_rounds: u32) -> Self {
        let kind = if first.kind.is_bot() || second.kind.is_bot() {
            MatchKind::Bot
        } else {
            MatchKind::Pvp
        };
        Self {
            kind,
            phase: Phase::Lobby,
            round: 1,
            max_rounds,
            turn: None,
            seats: [
                Seat::new(first, Role::First),
                Seat::new(second, Role::Second),
            ],
            auto_move_used: [false, false],
            selections: 0,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub fn turn(&self) -> Option<Role> {
        self.turn
    }

    pub fn selections(&self) -> u8 {
        self.selections
    }

    pub fn seat(&self, role: Role) -> &Seat {
        &self.seats[role.index()]
    }

    /// Seat lookup by player identity.
    pub fn role_of(&self, identity: &str) -> Option<Role> {
        self.seats
            .iter()
            .find(|s| s.identity == identity)
            .map(|s| s.role)
    }

    pub fn auto_move_used(&self, role: Role) -> bool {
        self.auto_move_used[role.index()]
    }

    /// Both in-match scores, first seat then second.
    pub fn scores(&self) -> (u32, u32) {
        (self.seats[0].score, self.seats[1].score)
    }

    /// Strictly higher score wins. `None` is a draw.
    pub fn winner(&self) -> Option<Role> {
        let (a, b) = self.scores();
        match a.cmp(&b) {
            std::cmp::Ordering::Greater => Some(Role::First),
            std::cmp::Ordering::Less => Some(Role::Second),
            std::cmp::Ordering::Equal => None,
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Check that `values` is a usable arrangement without touching state.
    pub fn validate_combination(values: &[u8]) -> Result<(), GameError> {
        if values.len() != SLOTS_PER_ROUND as usize {
            return Err(GameError::InvalidCombination);
        }
        if values.iter().any(|&v| v < 1 || v > MAX_COMBINATION_VALUE) {
            return Err(GameError::InvalidCombination);
        }
        Ok(())
    }

    /// Commit a full arrangement for one seat. Replaces any previous one.
    pub fn commit_combination(&mut self, role: Role, values: &[u8]) -> Result<(), GameError> {
        Self::validate_combination(values)?;
        let mut combination = [0u8; SLOTS_PER_ROUND as usize];
        combination.copy_from_slice(values);
        self.seats[role.index()].combination = Some(combination);
        Ok(())
    }

    pub fn combination_committed(&self, role: Role) -> bool {
        self.seats[role.index()].combination.is_some()
    }

    /// Enter the playing phase: fill any uncommitted combination with random
    /// die faces and pick the starting turn uniformly at random.
    pub fn start_play<R: Rng>(&mut self, rng: &mut R) -> Role {
        for seat in &mut self.seats {
            if seat.combination.is_none() {
                let mut combination = [0u8; SLOTS_PER_ROUND as usize];
                for value in &mut combination {
                    *value = rng.random_range(1..=DIE_FACES);
                }
                seat.combination = Some(combination);
            }
        }
        self.phase = Phase::Playing;
        let starter = if rng.random_bool(0.5) {
            Role::First
        } else {
            Role::Second
        };
        self.turn = Some(starter);
        starter
    }

    /// Consume `slot` for `role`, revealing the opponent's value there.
    pub fn apply_move(&mut self, role: Role, slot: u8) -> Result<MoveOutcome, GameError> {
        if self.phase != Phase::Playing {
            return Err(GameError::WrongPhase(self.phase));
        }
        if self.turn != Some(role) {
            return Err(GameError::OutOfTurn);
        }
        if !self.seats[role.index()].slots.contains(&slot) {
            return Err(GameError::SlotUnavailable(slot));
        }
        let opponent = role.opponent();
        let revealed = self.seats[opponent.index()]
            .combination
            .ok_or(GameError::CombinationMissing(opponent))?[usize::from(slot - 1)];

        let seat = &mut self.seats[role.index()];
        seat.slots.remove(&slot);
        seat.score += u32::from(revealed);
        self.selections += 1;

        Ok(MoveOutcome {
            slot,
            revealed,
            actor_score: seat.score,
            selections: self.selections,
            round_complete: self.selections >= SLOTS_PER_ROUND,
        })
    }

    /// Hand the turn to the other seat. Returns the new holder.
    pub fn pass_turn(&mut self) -> Option<Role> {
        self.turn = self.turn.map(Role::opponent);
        self.turn
    }

    /// Drop the turn holder entirely. Moves are rejected until play resumes.
    pub fn clear_turn(&mut self) {
        self.turn = None;
    }

    pub fn mark_auto_move(&mut self, role: Role) {
        self.auto_move_used[role.index()] = true;
    }

    /// A random slot still available to `role`, or `None` when the round
    /// holds nothing left to pick.
    pub fn random_available_slot<R: Rng>(&self, role: Role, rng: &mut R) -> Option<u8> {
        let slots = &self.seats[role.index()].slots;
        if slots.is_empty() {
            return None;
        }
        let nth = rng.random_range(0..slots.len());
        slots.iter().nth(nth).copied()
    }

    /// Swap two entries of one seat's own arrangement. Out-of-range indices
    /// and uncommitted arrangements are silent no-ops, per the protocol.
    pub fn swap_combination(&mut self, role: Role, a: usize, b: usize) -> bool {
        let limit = SLOTS_PER_ROUND as usize;
        if a >= limit || b >= limit {
            return false;
        }
        match &mut self.seats[role.index()].combination {
            Some(combination) => {
                combination.swap(a, b);
                true
            }
            None => false,
        }
    }

    /// Move to the next round: uncommitted combinations, full slot sets,
    /// zeroed selection counter, cleared auto-move flags, no turn holder.
    /// Scores carry over untouched.
    pub fn advance_round(&mut self) {
        self.round += 1;
        self.selections = 0;
        self.auto_move_used = [false, false];
        self.turn = None;
        for seat in &mut self.seats {
            seat.combination = None;
            seat.slots = full_slot_set();
        }
    }

    pub fn is_final_round(&self) -> bool {
        self.round >= self.max_rounds
    }
}

// ============================================================================
// Tests
// ============================================================================
