//! Match creation.
//!
//! The matchmaker and the socket layer both create matches through
//! [`MatchService`]: it refuses identities that are already owned or have no
//! live transport, claims directory ownership, and spawns the actor task.
//! A refused creation puts every unowned human back into the queue so nobody
//! is left orphaned.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use ulid::Ulid;

use crate::connection::ConnectionRegistry;
use crate::matchmaking::{MatchQueue, RecentMatches, WaitingPlayer};
use crate::score::ScoreStore;

use super::actor::MatchActor;
use super::actor_types::{ActorConfig, GameTimings};
use super::directory::{DirectoryError, MatchDirectory};
use super::game::SeatSpec;
use super::handle::MatchHandle;

/// Prefix for match identifiers.
pub const MATCH_ID_PREFIX: &str = "match_";

/// Prefix for synthetic bot identities.
pub const BOT_ID_PREFIX: &str = "bot_";

/// Why a match could not be created.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CreateError {
    #[error("{0} already has an active match")]
    AlreadyOwned(String),

    #[error("{0} has no live connection")]
    Unreachable(String),
}

impl From<DirectoryError> for CreateError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::IdentityOwned { identity, .. } => CreateError::AlreadyOwned(identity),
        }
    }
}

/// Creates matches and wires their actors to the shared collaborators.
#[derive(Clone)]
pub struct MatchService {
    directory: MatchDirectory,
    connections: ConnectionRegistry,
    queue: Arc<MatchQueue>,
    recent: RecentMatches,
    scores: Arc<dyn ScoreStore>,
    timings: GameTimings,
}

impl MatchService {
    pub fn new(
        directory: MatchDirectory,
        connections: ConnectionRegistry,
        queue: Arc<MatchQueue>,
        recent: RecentMatches,
        scores: Arc<dyn ScoreStore>,
        timings: GameTimings,
    ) -> Self {
        Self {
            directory,
            connections,
            queue,
            recent,
            scores,
            timings,
        }
    }

    pub fn directory(&self) -> &MatchDirectory {
        &self.directory
    }

    /// Create a two-human match.
    pub async fn create_session(&self, first: &str, second: &str) -> Result<MatchHandle, CreateError> {
        self.create(SeatSpec::human(first), SeatSpec::human(second))
            .await
    }

    /// Create a match against a synthetic opponent. Bot seats need no
    /// transport and are always considered reachable.
    pub async fn create_bot_session(&self, identity: &str) -> Result<MatchHandle, CreateError> {
        let bot = SeatSpec::bot(format!("{}{}", BOT_ID_PREFIX, Ulid::new()));
        self.create(SeatSpec::human(identity), bot).await
    }

    async fn create(&self, first: SeatSpec, second: SeatSpec) -> Result<MatchHandle, CreateError> {
        let id = format!("{}{}", MATCH_ID_PREFIX, Ulid::new());

        for spec in [&first, &second] {
            if !spec.kind.is_bot() && !self.connections.is_reachable(&spec.identity) {
                info!(identity = %spec.identity, "Refusing match creation, transport closed");
                self.requeue_unowned(&first, &second).await;
                return Err(CreateError::Unreachable(spec.identity.clone()));
            }
        }

        let config = ActorConfig {
            id: id.clone(),
            first: first.clone(),
            second: second.clone(),
            timings: self.timings.clone(),
            connections: self.connections.clone(),
            scores: self.scores.clone(),
            directory: self.directory.clone(),
            queue: self.queue.clone(),
            recent: self.recent.clone(),
        };
        let (tx, task_handle) = MatchActor::spawn(config, self.directory.subscribe_shutdown());
        let handle = MatchHandle::new(tx, id.clone());

        if let Err(e) = self
            .directory
            .register(handle.clone(), &first.identity, &second.identity)
        {
            warn!(match_id = %id, error = %e, "Match creation lost the ownership race");
            task_handle.abort();
            self.requeue_unowned(&first, &second).await;
            return Err(e.into());
        }
        self.directory.adopt_task(task_handle).await;

        info!(
            match_id = %id,
            first = %first.identity,
            second = %second.identity,
            "Match created"
        );
        Ok(handle)
    }

    /// Put every human seat that no match owns back into the queue.
    async fn requeue_unowned(&self, first: &SeatSpec, second: &SeatSpec) {
        for spec in [first, second] {
            if spec.kind.is_bot() || self.directory.is_owned(&spec.identity) {
                continue;
            }
            let score = self.scores.score(&spec.identity).await.unwrap_or(0);
            self.queue
                .requeue(WaitingPlayer::new(spec.identity.clone(), score))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::score::MemoryScoreStore;
    use crate::session::game::MatchKind;

    fn setup_service() -> (MatchService, ConnectionRegistry, Arc<MatchQueue>) {
        let connections = ConnectionRegistry::new();
        let queue = Arc::new(MatchQueue::new());
        let service = MatchService::new(
            MatchDirectory::new(),
            connections.clone(),
            queue.clone(),
            RecentMatches::new(),
            Arc::new(MemoryScoreStore::default()),
            GameTimings::default(),
        );
        (service, connections, queue)
    }

    fn connect(
        connections: &ConnectionRegistry,
        identity: &str,
    ) -> mpsc::UnboundedReceiver<crate::session::events::ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        connections.register(identity, tx);
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn create_session_registers_both_identities() {
        let (service, connections, _queue) = setup_service();
        let _alice = connect(&connections, "alice");
        let _bob = connect(&connections, "bob");

        let handle = service.create_session("alice", "bob").await.unwrap();

        assert!(handle.id().starts_with(MATCH_ID_PREFIX));
        assert_eq!(service.directory().len(), 1);
        assert!(service.directory().is_owned("alice"));
        assert!(service.directory().is_owned("bob"));
        assert_eq!(
            service
                .directory()
                .find_by_identity("alice")
                .map(|h| h.id().to_string()),
            Some(handle.id().to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_identity_is_refused_and_requeued() {
        let (service, connections, queue) = setup_service();
        let _alice = connect(&connections, "alice");

        let result = service.create_session("alice", "bob").await;

        assert_eq!(result, Err(CreateError::Unreachable("bob".to_string())));
        assert!(service.directory().is_empty());
        assert!(queue.contains("alice").await);
        assert!(queue.contains("bob").await);
    }

    #[tokio::test(start_paused = true)]
    async fn owned_identity_is_refused_and_partner_requeued() {
        let (service, connections, queue) = setup_service();
        let _alice = connect(&connections, "alice");
        let _bob = connect(&connections, "bob");
        let _carol = connect(&connections, "carol");
        service.create_session("alice", "bob").await.unwrap();

        let result = service.create_session("alice", "carol").await;

        assert_eq!(result, Err(CreateError::AlreadyOwned("alice".to_string())));
        assert_eq!(service.directory().len(), 1);
        assert!(!queue.contains("alice").await);
        assert!(queue.contains("carol").await);
    }

    #[tokio::test(start_paused = true)]
    async fn bot_session_needs_only_the_human_transport() {
        let (service, connections, _queue) = setup_service();
        let _alice = connect(&connections, "alice");

        let handle = service.create_bot_session("alice").await.unwrap();

        let metadata = handle.metadata().await.unwrap();
        assert_eq!(metadata.kind, MatchKind::Bot);
        assert!(metadata.players.1.starts_with(BOT_ID_PREFIX));
        assert!(service.directory().is_owned("alice"));
    }
}
