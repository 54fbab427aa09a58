//! Per-match actor for serialized state mutations.
//!
//! Each match gets a dedicated actor task that:
//! - Serializes all mutations via message passing (no locks)
//! - Owns the game state and the single countdown slot
//! - Drives every timed transition from one 1s heartbeat
//!
//! Timer callbacks and player actions land in the same loop, so a move and
//! the turn countdown expiring can never race on one match. Broadcasts go
//! out in the order the transitions occurred.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

use crate::connection::ConnectionRegistry;
use crate::matchmaking::{MatchQueue, RecentMatches, WaitingPlayer};
use crate::score::{DisconnectSettlement, MatchOutcome, ScoreStore};

use super::actor_types::{
    ActionError, ActorConfig, CHANNEL_CAPACITY, Countdown, GameTimings, MatchCommand,
    MatchMetadata, TICK_INTERVAL,
};
use super::directory::MatchDirectory;
use super::events::{MoveAction, ScorePair, ServerEvent, StateSnapshot, TimerKind};
use super::game::{GameError, GameState, MatchKind, MoveOutcome, Phase, Role};

// ============================================================================
// Match Actor
// ============================================================================

/// Per-match actor that owns state and handles mutations.
pub struct MatchActor {
    // Identity
    id: String,
    created_at: DateTime<Utc>,

    // State
    game: GameState,
    timings: GameTimings,

    // The single countdown slot. `next_generation` only grows; a countdown
    // whose generation no longer matches the slot is stale.
    countdown: Option<Countdown>,
    next_generation: u64,

    /// Whether each seat has been reachable at least once while in lobby.
    /// A seat that was seen and then lost cancels the lobby early; one that
    /// was never seen just waits for the lobby timeout.
    seen_ready: [bool; 2],

    // Collaborators
    connections: ConnectionRegistry,
    scores: Arc<dyn ScoreStore>,
    directory: MatchDirectory,
    queue: Arc<MatchQueue>,
    recent: RecentMatches,

    // Communication
    command_rx: mpsc::Receiver<MatchCommand>,
    shutdown_rx: watch::Receiver<bool>,

    /// Set by cleanup; the loop exits at the end of the current iteration.
    finished: bool,
}

impl MatchActor {
    /// Spawn a new match actor in the lobby phase.
    ///
    /// Returns the command sender and a JoinHandle for the actor task.
    /// The lobby countdown is armed before any command is processed.
    pub fn spawn(
        config: ActorConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (mpsc::Sender<MatchCommand>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let actor = Self {
            id: config.id,
            created_at: Utc::now(),
            game: GameState::new(config.first, config.second, config.timings.max_rounds),
            timings: config.timings,
            countdown: None,
            next_generation: 0,
            seen_ready: [false, false],
            connections: config.connections,
            scores: config.scores,
            directory: config.directory,
            queue: config.queue,
            recent: config.recent,
            command_rx: rx,
            shutdown_rx,
            finished: false,
        };

        let handle = tokio::spawn(actor.run());
        (tx, handle)
    }

    async fn run(mut self) {
        debug!(match_id = %self.id, kind = %self.game.kind(), "Match actor started");
        self.arm(TimerKind::Lobby, self.timings.lobby_secs);
        self.command_loop().await;
        debug!(match_id = %self.id, "Match actor stopped");
    }

    /// Main command processing loop.
    async fn command_loop(&mut self) {
        let mut heartbeat = interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);

        loop {
            tokio::select! {
                // Check for shutdown signal
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        debug!(match_id = %self.id, "Match actor received shutdown signal");
                        // Answer anything already queued before going away
                        self.drain_commands().await;
                        break;
                    }
                }

                // Process commands
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            // All handles dropped, shutdown
                            debug!(match_id = %self.id, "All handles dropped, shutting down");
                            break;
                        }
                    }
                }

                // Countdowns and the lobby readiness check
                _ = heartbeat.tick() => {
                    self.handle_tick().await;
                }
            }

            if self.finished {
                break;
            }
        }
    }

    /// Drain and process all remaining commands in the queue.
    async fn drain_commands(&mut self) {
        while let Ok(cmd) = self.command_rx.try_recv() {
            self.handle_command(cmd).await;
        }
    }

    /// Handle a single command.
    async fn handle_command(&mut self, cmd: MatchCommand) {
        match cmd {
            MatchCommand::SubmitMove {
                identity,
                slot,
                revealed_value,
                combination,
                reply,
            } => {
                let result = self.submit_move(&identity, slot, revealed_value, combination);
                let _ = reply.send(result);
            }
            MatchCommand::SubmitSwap {
                identity,
                pos_a,
                pos_b,
                combination,
                reply,
            } => {
                let result = self.submit_swap(&identity, pos_a, pos_b, combination);
                let _ = reply.send(result);
            }
            MatchCommand::SubmitEmoji {
                identity,
                emoji_index,
                reply,
            } => {
                let result = self.submit_emoji(&identity, emoji_index);
                let _ = reply.send(result);
            }
            MatchCommand::ReportDisconnect { identity, reply } => {
                let result = match self.role_of(&identity) {
                    Ok(role) => {
                        self.handle_departure(role, "disconnected").await;
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            MatchCommand::CancelLobby { identity, reply } => {
                let result = self.cancel_lobby(&identity).await;
                let _ = reply.send(result);
            }
            MatchCommand::GetSnapshot { identity, reply } => {
                let result = self
                    .role_of(&identity)
                    .map(|role| StateSnapshot::for_role(&self.id, &self.game, role));
                let _ = reply.send(result);
            }
            MatchCommand::GetMetadata { reply } => {
                let _ = reply.send(self.metadata());
            }
        }
    }

    // ------------------------------------------------------------------------
    // Heartbeat
    // ------------------------------------------------------------------------

    async fn handle_tick(&mut self) {
        let live_generation = self.countdown.map(|c| c.generation);

        if self.game.phase() == Phase::Lobby {
            self.check_lobby_readiness().await;
            if self.finished {
                return;
            }
        }

        let Some(mut countdown) = self.countdown else {
            return;
        };
        // A countdown armed during this same tick starts counting on the next.
        if Some(countdown.generation) != live_generation {
            return;
        }

        countdown.remaining = countdown.remaining.saturating_sub(1);
        self.countdown = Some(countdown);

        if countdown.kind.is_broadcast() {
            self.broadcast(ServerEvent::TimerUpdate {
                kind: countdown.kind,
                remaining: countdown.remaining,
            });
        }
        if countdown.remaining == 0 {
            self.on_countdown_expired(countdown).await;
        }
    }

    async fn on_countdown_expired(&mut self, expired: Countdown) {
        self.clear_countdown();
        match expired.kind {
            TimerKind::Lobby => self.cancel_lobby_phase("connection delay exceeded").await,
            TimerKind::Preparation => self.enter_playing(),
            TimerKind::Turn => self.handle_turn_timeout().await,
            TimerKind::BotThink => self.play_bot_move(),
            TimerKind::Settle => self.advance_or_finish().await,
            TimerKind::Cleanup => self.cleanup(),
        }
    }

    async fn check_lobby_readiness(&mut self) {
        let mut all_ready = true;
        let mut dropped = None;

        for role in [Role::First, Role::Second] {
            let seat = self.game.seat(role);
            let reachable = seat.kind.is_bot() || self.connections.is_reachable(&seat.identity);
            if reachable {
                self.seen_ready[role.index()] = true;
            } else {
                all_ready = false;
                if self.seen_ready[role.index()] {
                    dropped = Some(role);
                }
            }
        }

        if let Some(role) = dropped {
            info!(match_id = %self.id, %role, "Participant dropped while waiting in lobby");
            self.cancel_lobby_phase("opponent lost connection").await;
            return;
        }
        if all_ready {
            self.clear_countdown();
            self.enter_preparing(true);
        }
    }

    // ------------------------------------------------------------------------
    // Phase Transitions
    // ------------------------------------------------------------------------

    /// Enter the preparation phase. `first_entry` announces the match itself;
    /// round re-entries only announce the phase.
    fn enter_preparing(&mut self, first_entry: bool) {
        self.game.set_phase(Phase::Preparing);

        if first_entry {
            for role in [Role::First, Role::Second] {
                let seat = self.game.seat(role);
                if seat.kind.is_bot() {
                    continue;
                }
                let opponent = self.game.seat(role.opponent()).identity.clone();
                self.connections.send(
                    &seat.identity,
                    ServerEvent::GameStart {
                        match_id: self.id.clone(),
                        you: role,
                        opponent,
                        kind: self.game.kind(),
                    },
                );
            }
        }

        self.broadcast(ServerEvent::PhaseChange {
            phase: Phase::Preparing,
            round: self.game.round(),
        });
        self.send_snapshots();
        self.arm(TimerKind::Preparation, self.timings.preparation_secs);
        info!(match_id = %self.id, round = self.game.round(), "Preparation started");
    }

    fn enter_playing(&mut self) {
        let starter = self.game.start_play(&mut rand::rng());
        info!(
            match_id = %self.id,
            round = self.game.round(),
            %starter,
            "Play started"
        );
        self.broadcast(ServerEvent::PhaseChange {
            phase: Phase::Playing,
            round: self.game.round(),
        });
        self.broadcast(ServerEvent::TurnChange {
            role: starter,
            round: self.game.round(),
        });
        self.arm_turn_countdown();
    }

    /// Arm the countdown for whoever now holds the turn. Bot seats think on
    /// a much shorter clock than humans get.
    fn arm_turn_countdown(&mut self) {
        let Some(turn) = self.game.turn() else {
            return;
        };
        if self.game.seat(turn).kind.is_bot() {
            self.arm(TimerKind::BotThink, self.timings.bot_think_secs);
        } else {
            self.arm(TimerKind::Turn, self.timings.turn_secs);
        }
    }

    fn end_round(&mut self) {
        self.game.clear_turn();
        let scores = ScorePair::from_state(&self.game);
        info!(
            match_id = %self.id,
            round = self.game.round(),
            first = scores.first,
            second = scores.second,
            "Round complete"
        );
        self.broadcast(ServerEvent::RoundEnd {
            round: self.game.round(),
            scores,
        });
        self.arm(TimerKind::Settle, self.timings.settle_secs);
    }

    async fn advance_or_finish(&mut self) {
        if self.game.is_final_round() {
            self.finish_match().await;
        } else {
            self.game.advance_round();
            self.enter_preparing(false);
        }
    }

    async fn finish_match(&mut self) {
        self.clear_countdown();
        self.game.clear_turn();
        self.game.set_phase(Phase::Ended);

        let scores = ScorePair::from_state(&self.game);
        let winner = self.game.winner();
        self.broadcast(ServerEvent::PhaseChange {
            phase: Phase::Ended,
            round: self.game.round(),
        });

        // Settlement completes before the final broadcast goes out.
        if let Some(winner_role) = winner {
            let outcome = MatchOutcome {
                winner: self.game.seat(winner_role).identity.clone(),
                loser: self.game.seat(winner_role.opponent()).identity.clone(),
                winner_score: scores.get(winner_role),
                loser_score: scores.get(winner_role.opponent()),
            };
            if let Err(e) = self.scores.apply_match_result(&outcome).await {
                warn!(match_id = %self.id, error = %e, "Failed to persist match result");
            }
        } else {
            debug!(match_id = %self.id, "Draw, no score change");
        }

        self.broadcast(ServerEvent::GameEnd { scores, winner });
        self.note_finished_pair();
        info!(match_id = %self.id, winner = ?winner, "Match ended");
        self.arm(TimerKind::Cleanup, self.timings.cleanup_secs);
    }

    /// End the match because `leaver` is gone, whatever the cause: transport
    /// loss, explicit logout, or turn-timeout abandonment. In the lobby this
    /// degrades to a cancellation instead.
    async fn handle_departure(&mut self, leaver: Role, reason: &str) {
        if self.game.phase() == Phase::Lobby {
            self.cancel_lobby_phase("opponent left").await;
            return;
        }
        if self.game.phase().is_terminal() {
            return;
        }

        let remainer = leaver.opponent();
        info!(match_id = %self.id, %leaver, reason, "Participant left the match");
        self.clear_countdown();
        self.game.clear_turn();
        self.game.set_phase(Phase::Ended);

        self.send_to(
            remainer,
            ServerEvent::OpponentLeft {
                reason: reason.to_string(),
            },
        );

        let settlement = match self.game.kind() {
            MatchKind::Pvp => Some(DisconnectSettlement::Pvp {
                leaver: self.game.seat(leaver).identity.clone(),
                remainer: self.game.seat(remainer).identity.clone(),
            }),
            MatchKind::Bot => {
                let remainer_seat = self.game.seat(remainer);
                if remainer_seat.kind.is_bot() {
                    // A human walking out on a bot forfeits nothing.
                    None
                } else {
                    Some(DisconnectSettlement::BotWalkover {
                        human: remainer_seat.identity.clone(),
                        round_score: remainer_seat.score,
                    })
                }
            }
        };
        if let Some(settlement) = settlement
            && let Err(e) = self.scores.apply_disconnect(&settlement).await
        {
            warn!(match_id = %self.id, error = %e, "Failed to persist disconnect settlement");
        }

        self.broadcast(ServerEvent::PhaseChange {
            phase: Phase::Ended,
            round: self.game.round(),
        });
        self.broadcast(ServerEvent::GameEnd {
            scores: ScorePair::from_state(&self.game),
            winner: Some(remainer),
        });
        self.note_finished_pair();
        self.arm(TimerKind::Cleanup, self.timings.cleanup_secs);
    }

    /// Cancel out of the lobby. Reachable participants are told; unreachable
    /// ones go back into the matchmaking queue instead of being orphaned.
    async fn cancel_lobby_phase(&mut self, reason: &str) {
        self.clear_countdown();
        self.game.set_phase(Phase::Cancelled);
        info!(match_id = %self.id, reason, "Lobby cancelled");

        let seats: Vec<_> = [Role::First, Role::Second]
            .iter()
            .map(|&role| {
                let seat = self.game.seat(role);
                (seat.identity.clone(), seat.kind)
            })
            .collect();

        for (identity, kind) in seats {
            if kind.is_bot() {
                continue;
            }
            if self.connections.is_reachable(&identity) {
                self.connections.send(
                    &identity,
                    ServerEvent::MatchCancelled {
                        reason: reason.to_string(),
                    },
                );
            } else {
                let score = self.scores.score(&identity).await.unwrap_or(0);
                self.queue.requeue(WaitingPlayer::new(identity, score)).await;
            }
        }

        self.cleanup();
    }

    /// Release the directory entries and stop the loop. Safe to hit twice.
    fn cleanup(&mut self) {
        self.clear_countdown();
        let first = self.game.seat(Role::First).identity.clone();
        let second = self.game.seat(Role::Second).identity.clone();
        self.directory.remove(&self.id, &first, &second);
        self.finished = true;
        debug!(match_id = %self.id, "Match directory entries released");
    }

    // ------------------------------------------------------------------------
    // Timed Moves
    // ------------------------------------------------------------------------

    async fn handle_turn_timeout(&mut self) {
        let Some(role) = self.game.turn() else {
            return;
        };

        if !self.game.auto_move_used(role)
            && let Some(slot) = self.game.random_available_slot(role, &mut rand::rng())
        {
            self.game.mark_auto_move(role);
            info!(match_id = %self.id, %role, slot, "Turn expired, playing automatically");
            self.broadcast(ServerEvent::AutoMoveNotification { role, slot });
            if let Err(e) = self.commit_move(role, slot) {
                warn!(match_id = %self.id, error = %e, "Auto move failed");
            }
            return;
        }

        // Second expiry for the same role this round: the player is gone.
        self.handle_departure(role, "abandoned").await;
    }

    fn play_bot_move(&mut self) {
        let Some(role) = self.game.turn() else {
            return;
        };
        if let Some(slot) = self.game.random_available_slot(role, &mut rand::rng())
            && let Err(e) = self.commit_move(role, slot)
        {
            warn!(match_id = %self.id, error = %e, "Bot move failed");
        }
    }

    // ------------------------------------------------------------------------
    // Player Actions
    // ------------------------------------------------------------------------

    fn submit_move(
        &mut self,
        identity: &str,
        slot: u8,
        revealed_value: Option<u8>,
        combination: Option<Vec<u8>>,
    ) -> Result<(), ActionError> {
        let role = self.role_of(identity)?;
        if self.game.phase() != Phase::Playing {
            return Err(GameError::WrongPhase(self.game.phase()).into());
        }
        if let Some(values) = &combination {
            GameState::validate_combination(values)?;
        }

        let outcome = self.commit_move(role, slot)?;

        // The arrangement hint lands only once the move itself was accepted,
        // so a rejected action leaves no trace.
        if let Some(values) = &combination {
            let _ = self.game.commit_combination(role, values);
        }
        if let Some(hint) = revealed_value
            && hint != outcome.revealed
        {
            debug!(
                match_id = %self.id,
                %role,
                slot,
                hint,
                revealed = outcome.revealed,
                "Reveal hint did not match the board"
            );
        }
        Ok(())
    }

    fn submit_swap(
        &mut self,
        identity: &str,
        pos_a: usize,
        pos_b: usize,
        combination: Option<Vec<u8>>,
    ) -> Result<(), ActionError> {
        let role = self.role_of(identity)?;
        if self.game.phase() != Phase::Playing {
            return Err(GameError::WrongPhase(self.game.phase()).into());
        }

        // A full arrangement replaces wholesale; the indices then only tell
        // the client which dice moved. Without one, the swap is positional.
        let changed = if let Some(values) = &combination {
            self.game.commit_combination(role, values)?;
            true
        } else {
            self.game.swap_combination(role, pos_a, pos_b)
        };

        if changed
            && let Some(values) = self.game.seat(role).combination
        {
            self.send_to(
                role,
                ServerEvent::DiceSwapped {
                    pos_a,
                    pos_b,
                    combination: values.to_vec(),
                },
            );
        }
        Ok(())
    }

    fn submit_emoji(&mut self, identity: &str, emoji_index: u8) -> Result<(), ActionError> {
        let role = self.role_of(identity)?;
        if self.game.phase() != Phase::Playing {
            return Err(GameError::WrongPhase(self.game.phase()).into());
        }
        self.send_to(role.opponent(), ServerEvent::EmojiUsed { role, emoji_index });
        Ok(())
    }

    async fn cancel_lobby(&mut self, identity: &str) -> Result<(), ActionError> {
        self.role_of(identity)?;
        if self.game.phase() != Phase::Lobby {
            return Err(ActionError::AlreadyStarted);
        }
        self.cancel_lobby_phase("match cancelled").await;
        Ok(())
    }

    /// Apply a move, notify both seats, and drive whatever follows: the next
    /// turn or the end of the round.
    fn commit_move(&mut self, role: Role, slot: u8) -> Result<MoveOutcome, ActionError> {
        let outcome = self.game.apply_move(role, slot)?;
        let target = role.opponent();

        // The actor sees the reveal; the opponent only sees a die leave
        // their own board.
        self.send_to(
            role,
            ServerEvent::MoveMade {
                role,
                slot,
                revealed: Some(outcome.revealed),
                score: outcome.actor_score,
                action: MoveAction::Reveal,
                target,
            },
        );
        self.send_to(
            target,
            ServerEvent::MoveMade {
                role,
                slot,
                revealed: None,
                score: outcome.actor_score,
                action: MoveAction::Removal,
                target,
            },
        );
        debug!(
            match_id = %self.id,
            %role,
            slot,
            revealed = outcome.revealed,
            selections = outcome.selections,
            "Move committed"
        );

        if outcome.round_complete {
            self.end_round();
        } else {
            if let Some(next) = self.game.pass_turn() {
                self.broadcast(ServerEvent::TurnChange {
                    role: next,
                    round: self.game.round(),
                });
            }
            self.arm_turn_countdown();
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn role_of(&self, identity: &str) -> Result<Role, ActionError> {
        self.game
            .role_of(identity)
            .ok_or_else(|| GameError::UnknownParticipant(identity.to_string()).into())
    }

    fn arm(&mut self, kind: TimerKind, secs: u32) {
        self.next_generation += 1;
        self.countdown = Some(Countdown {
            kind,
            remaining: secs,
            generation: self.next_generation,
        });
    }

    fn clear_countdown(&mut self) {
        self.countdown = None;
    }

    /// Send to every human seat. Closed transports are skipped silently.
    fn broadcast(&self, event: ServerEvent) {
        for role in [Role::First, Role::Second] {
            self.send_to(role, event.clone());
        }
    }

    fn send_to(&self, role: Role, event: ServerEvent) {
        let seat = self.game.seat(role);
        if !seat.kind.is_bot() {
            self.connections.send(&seat.identity, event);
        }
    }

    fn send_snapshots(&self) {
        for role in [Role::First, Role::Second] {
            if self.game.seat(role).kind.is_bot() {
                continue;
            }
            self.send_to(
                role,
                ServerEvent::GameState {
                    state: StateSnapshot::for_role(&self.id, &self.game, role),
                },
            );
        }
    }

    /// Finished pvp pairs feed the rematch cooldown.
    fn note_finished_pair(&self) {
        if self.game.kind() == MatchKind::Pvp {
            let first = &self.game.seat(Role::First).identity;
            let second = &self.game.seat(Role::Second).identity;
            self.recent.record(first, second);
        }
    }

    fn metadata(&self) -> MatchMetadata {
        let (first_score, second_score) = self.game.scores();
        MatchMetadata {
            id: self.id.clone(),
            kind: self.game.kind(),
            phase: self.game.phase(),
            round: self.game.round(),
            turn: self.game.turn(),
            players: (
                self.game.seat(Role::First).identity.clone(),
                self.game.seat(Role::Second).identity.clone(),
            ),
            scores: (first_score, second_score),
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::score::MemoryScoreStore;
    use crate::session::game::SeatSpec;

    struct Fixture {
        connections: ConnectionRegistry,
        directory: MatchDirectory,
        queue: Arc<MatchQueue>,
        store: MemoryScoreStore,
        tx: mpsc::Sender<MatchCommand>,
        shutdown_tx: watch::Sender<bool>,
    }

    fn setup_actor(first: SeatSpec, second: SeatSpec) -> Fixture {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let connections = ConnectionRegistry::new();
        let directory = MatchDirectory::new();
        let queue = Arc::new(MatchQueue::new());
        let store = MemoryScoreStore::default();

        let config = ActorConfig {
            id: "match_test123".to_string(),
            first,
            second,
            timings: GameTimings::default(),
            connections: connections.clone(),
            scores: Arc::new(store.clone()),
            directory: directory.clone(),
            queue: queue.clone(),
            recent: RecentMatches::new(),
        };
        let (tx, _task_handle) = MatchActor::spawn(config, shutdown_rx);

        Fixture {
            connections,
            directory,
            queue,
            store,
            tx,
            shutdown_tx,
        }
    }

    fn attach(fixture: &Fixture, identity: &str) -> UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        fixture.connections.register(identity, tx);
        rx
    }

    /// Advance the paused clock one heartbeat at a time, yielding so the
    /// actor task processes each tick before the next lands.
    async fn tick_secs(n: u32) {
        // Let a freshly spawned actor run once so its heartbeat is armed
        // before the clock moves.
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        for _ in 0..n {
            tokio::time::advance(Duration::from_secs(1)).await;
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
        }
    }

    fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn metadata_of(tx: &mpsc::Sender<MatchCommand>) -> MatchMetadata {
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(MatchCommand::GetMetadata { reply: reply_tx })
            .await
            .unwrap();
        reply_rx.await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn lobby_advances_when_both_seats_reachable() {
        let fixture = setup_actor(SeatSpec::human("alice"), SeatSpec::human("bob"));
        let mut alice = attach(&fixture, "alice");
        let mut bob = attach(&fixture, "bob");

        tick_secs(1).await;

        let metadata = metadata_of(&fixture.tx).await;
        assert_eq!(metadata.phase, Phase::Preparing);

        let events = drain(&mut alice);
        assert!(matches!(
            events.first(),
            Some(ServerEvent::GameStart { you: Role::First, .. })
        ));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ServerEvent::GameState { .. }))
        );
        assert!(
            drain(&mut bob)
                .iter()
                .any(|e| matches!(e, ServerEvent::GameStart { you: Role::Second, .. }))
        );

        fixture.shutdown_tx.send(true).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn lobby_without_players_times_out_and_requeues() {
        let fixture = setup_actor(SeatSpec::human("alice"), SeatSpec::human("bob"));

        tick_secs(GameTimings::default().lobby_secs + 1).await;

        assert!(fixture.directory.is_empty());
        assert!(fixture.queue.contains("alice").await);
        assert!(fixture.queue.contains("bob").await);

        fixture.shutdown_tx.send(true).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn move_in_lobby_is_rejected() {
        let fixture = setup_actor(SeatSpec::human("alice"), SeatSpec::human("bob"));

        let (reply_tx, reply_rx) = oneshot::channel();
        fixture
            .tx
            .send(MatchCommand::SubmitMove {
                identity: "alice".to_string(),
                slot: 1,
                revealed_value: None,
                combination: None,
                reply: reply_tx,
            })
            .await
            .unwrap();

        assert_eq!(
            reply_rx.await.unwrap(),
            Err(ActionError::Rule(GameError::WrongPhase(Phase::Lobby)))
        );

        fixture.shutdown_tx.send(true).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_identity_is_rejected() {
        let fixture = setup_actor(SeatSpec::human("alice"), SeatSpec::human("bob"));

        let (reply_tx, reply_rx) = oneshot::channel();
        fixture
            .tx
            .send(MatchCommand::SubmitEmoji {
                identity: "mallory".to_string(),
                emoji_index: 2,
                reply: reply_tx,
            })
            .await
            .unwrap();

        assert_eq!(
            reply_rx.await.unwrap(),
            Err(ActionError::Rule(GameError::UnknownParticipant(
                "mallory".to_string()
            )))
        );

        fixture.shutdown_tx.send(true).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_lobby_reports_already_started() {
        let fixture = setup_actor(SeatSpec::human("alice"), SeatSpec::human("bob"));
        let _alice = attach(&fixture, "alice");
        let _bob = attach(&fixture, "bob");

        tick_secs(1).await;
        assert_eq!(metadata_of(&fixture.tx).await.phase, Phase::Preparing);

        let (reply_tx, reply_rx) = oneshot::channel();
        fixture
            .tx
            .send(MatchCommand::CancelLobby {
                identity: "alice".to_string(),
                reply: reply_tx,
            })
            .await
            .unwrap();

        assert_eq!(reply_rx.await.unwrap(), Err(ActionError::AlreadyStarted));

        fixture.shutdown_tx.send(true).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_cancel_notifies_reachable_participants() {
        let fixture = setup_actor(SeatSpec::human("alice"), SeatSpec::human("bob"));
        let mut alice = attach(&fixture, "alice");
        let mut bob = attach(&fixture, "bob");

        let (reply_tx, reply_rx) = oneshot::channel();
        fixture
            .tx
            .send(MatchCommand::CancelLobby {
                identity: "alice".to_string(),
                reply: reply_tx,
            })
            .await
            .unwrap();
        assert_eq!(reply_rx.await.unwrap(), Ok(()));

        assert!(
            drain(&mut alice)
                .iter()
                .any(|e| matches!(e, ServerEvent::MatchCancelled { .. }))
        );
        assert!(
            drain(&mut bob)
                .iter()
                .any(|e| matches!(e, ServerEvent::MatchCancelled { .. }))
        );
        assert!(fixture.directory.is_empty());

        fixture.shutdown_tx.send(true).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn bot_seat_counts_as_reachable() {
        let fixture = setup_actor(SeatSpec::human("alice"), SeatSpec::bot("bot_1"));
        let _alice = attach(&fixture, "alice");

        tick_secs(1).await;

        let metadata = metadata_of(&fixture.tx).await;
        assert_eq!(metadata.phase, Phase::Preparing);
        assert_eq!(metadata.kind, MatchKind::Bot);

        fixture.shutdown_tx.send(true).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_mid_play_applies_pvp_settlement() {
        let fixture = setup_actor(SeatSpec::human("alice"), SeatSpec::human("bob"));
        let _alice = attach(&fixture, "alice");
        let mut bob = attach(&fixture, "bob");
        fixture.store.set_score("alice", 100);
        fixture.store.set_score("bob", 100);

        // Through lobby and preparation into play.
        tick_secs(1 + GameTimings::default().preparation_secs).await;
        assert_eq!(metadata_of(&fixture.tx).await.phase, Phase::Playing);

        let (reply_tx, reply_rx) = oneshot::channel();
        fixture
            .tx
            .send(MatchCommand::ReportDisconnect {
                identity: "alice".to_string(),
                reply: reply_tx,
            })
            .await
            .unwrap();
        assert_eq!(reply_rx.await.unwrap(), Ok(()));

        let events = drain(&mut bob);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ServerEvent::OpponentLeft { .. }))
        );
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::GameEnd {
                winner: Some(Role::Second),
                ..
            }
        )));

        let rules = crate::score::ScoreRules::default();
        assert_eq!(
            fixture.store.score("alice").await.unwrap(),
            100 - rules.quit_penalty
        );
        assert_eq!(
            fixture.store.score("bob").await.unwrap(),
            100 + rules.quit_bonus
        );

        fixture.shutdown_tx.send(true).unwrap();
    }
}
