//! Match handle for communicating with a match actor.
//!
//! `MatchHandle` is a thin wrapper around an `mpsc::Sender<MatchCommand>`.
//! It provides async methods for every inbound operation and is cheap to
//! clone.

use std::fmt;

use tokio::sync::{mpsc, oneshot};

use super::actor_types::{ActionError, MatchCommand, MatchMetadata};
use super::events::StateSnapshot;

/// Handle for interacting with a match actor.
///
/// All methods communicate with the actor via message passing; a dropped
/// actor surfaces as [`ActionError::Shutdown`].
#[derive(Clone)]
pub struct MatchHandle {
    tx: mpsc::Sender<MatchCommand>,
    id: String,
}

impl PartialEq for MatchHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.tx.same_channel(&other.tx)
    }
}

impl Eq for MatchHandle {}

impl MatchHandle {
    pub(crate) fn new(tx: mpsc::Sender<MatchCommand>, id: String) -> Self {
        Self { tx, id }
    }

    /// The match ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    // ------------------------------------------------------------------------
    // Game Actions
    // ------------------------------------------------------------------------

    /// Submit a slot pick for `identity`.
    pub async fn submit_move(
        &self,
        identity: &str,
        slot: u8,
        revealed_value: Option<u8>,
        combination: Option<Vec<u8>>,
    ) -> Result<(), ActionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(MatchCommand::SubmitMove {
                identity: identity.to_string(),
                slot,
                revealed_value,
                combination,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ActionError::Shutdown)?;

        reply_rx.await.map_err(|_| ActionError::Shutdown)?
    }

    /// Swap two entries of the sender's own arrangement.
    pub async fn submit_swap(
        &self,
        identity: &str,
        pos_a: usize,
        pos_b: usize,
        combination: Option<Vec<u8>>,
    ) -> Result<(), ActionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(MatchCommand::SubmitSwap {
                identity: identity.to_string(),
                pos_a,
                pos_b,
                combination,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ActionError::Shutdown)?;

        reply_rx.await.map_err(|_| ActionError::Shutdown)?
    }

    /// Relay an emoji to the sender's opponent.
    pub async fn submit_emoji(&self, identity: &str, emoji_index: u8) -> Result<(), ActionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(MatchCommand::SubmitEmoji {
                identity: identity.to_string(),
                emoji_index,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ActionError::Shutdown)?;

        reply_rx.await.map_err(|_| ActionError::Shutdown)?
    }

    /// Report that `identity` lost its connection or left the match.
    pub async fn report_disconnect(&self, identity: &str) -> Result<(), ActionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(MatchCommand::ReportDisconnect {
                identity: identity.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| ActionError::Shutdown)?;

        reply_rx.await.map_err(|_| ActionError::Shutdown)?
    }

    /// Cancel a match that is still in the lobby.
    pub async fn cancel_lobby(&self, identity: &str) -> Result<(), ActionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(MatchCommand::CancelLobby {
                identity: identity.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| ActionError::Shutdown)?;

        reply_rx.await.map_err(|_| ActionError::Shutdown)?
    }

    // ------------------------------------------------------------------------
    // Read Operations
    // ------------------------------------------------------------------------

    /// Per-recipient snapshot, as sent on reconnect.
    pub async fn snapshot_for(&self, identity: &str) -> Result<StateSnapshot, ActionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(MatchCommand::GetSnapshot {
                identity: identity.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| ActionError::Shutdown)?;

        reply_rx.await.map_err(|_| ActionError::Shutdown)?
    }

    /// Point-in-time match metadata.
    pub async fn metadata(&self) -> Result<MatchMetadata, ActionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(MatchCommand::GetMetadata { reply: reply_tx })
            .await
            .map_err(|_| ActionError::Shutdown)?;

        reply_rx.await.map_err(|_| ActionError::Shutdown)
    }
}

impl fmt::Debug for MatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchHandle").field("id", &self.id).finish()
    }
}
