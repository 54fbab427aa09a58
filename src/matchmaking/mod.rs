//! Matchmaking: the waiting queue, pair selection, and the sweep task.
//!
//! Players join a FIFO queue over their socket. Once per second the
//! [`Matchmaker`] sweep picks the eligible pair with the closest persisted
//! scores, subject to a score-gap rule and a rematch cooldown, and asks the
//! match service to create their session. Selection itself is a pure
//! function; the sweep injects the ownership and reachability predicates.

mod pairing;
mod queue;
mod service;

pub use pairing::{PairingRules, RecentMatches, select_pair};
pub use queue::{JoinOutcome, MatchQueue, WaitingPlayer};
pub use service::{Matchmaker, SWEEP_INTERVAL};
