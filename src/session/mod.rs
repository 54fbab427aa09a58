//! Match sessions for Rollduel.
//!
//! # Architecture
//!
//! ```text
//!  ┌─────────────────┐        ┌───────────────┐
//!  │  MatchDirectory │──owns──▶  MatchActor   │  (one per match, runs in a tokio task)
//!  │ (identity/id →  │        │  owns state,  │
//!  │     Handle)     │        │  countdowns,  │
//!  └────────┬────────┘        │  serializes   │
//!           │                 │  mutations    │
//!           │ clone           └───────▲───────┘
//!           ▼                         │ mpsc messages
//!  ┌─────────────────┐                │
//!  │   MatchHandle   │────────────────┘  (cheap cloneable sender)
//!  └─────────────────┘
//!
//!  ┌─────────────────┐
//!  │  MatchService   │  Claims directory ownership for both identities and
//!  │                 │  spawns the actor. Rejects owned/unreachable seats.
//!  └─────────────────┘
//! ```
//!
//! - **MatchActor** — owns the mutable game state and the single countdown
//!   slot; processes commands and 1s heartbeat ticks sequentially so timer
//!   expiry can never race a player action.
//! - **MatchHandle** — cloneable reference that sends commands to an actor.
//!   All external code interacts with matches through handles.
//! - **MatchDirectory** — maps match ids and participant identities to
//!   handles; one identity never owns two matches at once.
//! - **MatchService** — creation entry point shared by the matchmaker and
//!   the socket layer.

mod actor;
mod actor_types;
mod directory;
mod events;
mod game;
mod handle;
mod service;

// Types and errors
pub use actor_types::{ActionError, GameTimings, MatchMetadata};
pub use events::{
    ClientAction, MoveAction, RevealedSlot, ScorePair, ServerEvent, StateSnapshot, TimerKind,
};
pub use game::{
    GameError, GameState, MatchKind, Phase, Role, SeatKind, SeatSpec,
};

// Lifecycle
pub use directory::{DirectoryError, MatchDirectory};
pub use handle::MatchHandle;
pub use service::{BOT_ID_PREFIX, CreateError, MATCH_ID_PREFIX, MatchService};
