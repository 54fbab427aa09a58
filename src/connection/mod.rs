//! Outbound connection registry.
//!
//! Maps a player identity to the sender half of its socket task. Reachability
//! checks and event delivery go through here; a missing or closed entry is
//! never an error, the send is simply skipped.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;

use crate::session::ServerEvent;

/// Sender half of one player's socket task.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Process-wide identity to transport map.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<String, EventSender>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a transport, replacing any previous one for this identity.
    pub fn register(&self, identity: impl Into<String>, sender: EventSender) {
        self.connections.insert(identity.into(), sender);
    }

    /// Detach a transport, but only while `sender` is still the live one.
    /// Returns false when a reconnect has replaced it already, in which case
    /// the caller must not treat the identity as gone.
    pub fn unregister(&self, identity: &str, sender: &EventSender) -> bool {
        self.connections
            .remove_if(identity, |_, live| live.same_channel(sender))
            .is_some()
    }

    /// A participant counts as reachable while its sender accepts events.
    pub fn is_reachable(&self, identity: &str) -> bool {
        self.connections
            .get(identity)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Deliver one event, skipping silently when the player is unreachable.
    pub fn send(&self, identity: &str, event: ServerEvent) {
        if let Some(tx) = self.connections.get(identity)
            && tx.send(event).is_err()
        {
            trace!(identity, "dropped event for closed connection");
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
