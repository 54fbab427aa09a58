//! Match directory for locating live sessions.
//!
//! The directory is the only shared lookup surface of the server:
//! - match id to handle, for routing commands
//! - player identity to match id, for the one-match-per-identity rule
//! - actor task handles, for graceful shutdown
//!
//! Claiming both identities is all-or-nothing; removal is idempotent and
//! never clobbers a newer claim. Thread-safe and cheap to clone.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::actor_types::MatchMetadata;
use super::handle::MatchHandle;

// ============================================================================
// Errors
// ============================================================================

/// Errors from directory operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// An identity is already seated in a live match.
    #[error("{identity} already has an active match")]
    IdentityOwned { identity: String, match_id: String },
}

// ============================================================================
// Constants
// ============================================================================

/// Maximum concurrent metadata fetches for `list()`.
const LIST_CONCURRENCY: usize = 32;

// ============================================================================
// Match Directory
// ============================================================================

/// Process-wide table of live matches.
#[derive(Clone)]
pub struct MatchDirectory {
    /// Match handles by ID.
    handles: Arc<DashMap<String, MatchHandle>>,
    /// Which match currently owns each identity.
    owners: Arc<DashMap<String, String>>,
    /// Actor task handles for graceful shutdown.
    task_handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    /// Shutdown signal sender.
    shutdown_tx: Arc<watch::Sender<bool>>,
    /// Shutdown signal receiver (cloned for each actor).
    shutdown_rx: watch::Receiver<bool>,
}

impl MatchDirectory {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            handles: Arc::new(DashMap::new()),
            owners: Arc::new(DashMap::new()),
            task_handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Claim both identities for a match and publish its handle.
    ///
    /// Fails without side effects when either identity is already seated
    /// elsewhere.
    pub fn register(
        &self,
        handle: MatchHandle,
        first: &str,
        second: &str,
    ) -> Result<(), DirectoryError> {
        let match_id = handle.id().to_string();

        match self.owners.entry(first.to_string()) {
            Entry::Occupied(existing) => {
                return Err(DirectoryError::IdentityOwned {
                    identity: first.to_string(),
                    match_id: existing.get().clone(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(match_id.clone());
            }
        }
        match self.owners.entry(second.to_string()) {
            Entry::Occupied(existing) => {
                let err = DirectoryError::IdentityOwned {
                    identity: second.to_string(),
                    match_id: existing.get().clone(),
                };
                drop(existing);
                // Roll back the first claim so the failure leaves no trace.
                self.owners.remove_if(first, |_, owner| *owner == match_id);
                return Err(err);
            }
            Entry::Vacant(slot) => {
                slot.insert(match_id.clone());
            }
        }

        self.handles.insert(match_id, handle);
        Ok(())
    }

    /// Keep an actor task so shutdown can wait for it.
    pub async fn adopt_task(&self, task: JoinHandle<()>) {
        let mut guard = self.task_handles.lock().await;
        guard.retain(|h| !h.is_finished());
        guard.push(task);
    }

    /// Shutdown receiver to hand into a spawned actor.
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// Get a match handle by ID.
    pub fn get(&self, match_id: &str) -> Option<MatchHandle> {
        self.handles.get(match_id).map(|r| r.clone())
    }

    /// The match currently seating `identity`, if any.
    pub fn find_by_identity(&self, identity: &str) -> Option<MatchHandle> {
        let match_id = self.owners.get(identity)?.clone();
        self.get(&match_id)
    }

    pub fn is_owned(&self, identity: &str) -> bool {
        self.owners.contains_key(identity)
    }

    pub fn contains(&self, match_id: &str) -> bool {
        self.handles.contains_key(match_id)
    }

    /// Metadata for all live matches, fetched in parallel.
    pub async fn list(&self) -> Vec<MatchMetadata> {
        let handles: Vec<_> = self
            .handles
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        stream::iter(handles)
            .map(|handle| async move { handle.metadata().await })
            .buffer_unordered(LIST_CONCURRENCY)
            .filter_map(|result| async move { result.ok() })
            .collect()
            .await
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    // ------------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------------

    /// Drop a match and release its identities. Idempotent; identity
    /// mappings claimed by a newer match are left alone.
    pub fn remove(&self, match_id: &str, first: &str, second: &str) -> bool {
        let removed = self.handles.remove(match_id).is_some();
        for identity in [first, second] {
            self.owners.remove_if(identity, |_, owner| owner == match_id);
        }
        removed
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    /// Gracefully shut down all match actors.
    ///
    /// Sends the shutdown signal and waits for every actor task to finish.
    pub async fn shutdown(&self) {
        info!("shutting down match directory");

        if self.shutdown_tx.send(true).is_err() {
            warn!("failed to send shutdown signal");
            return;
        }

        let task_handles = {
            let mut handles = self.task_handles.lock().await;
            std::mem::take(&mut *handles)
        };

        for task_handle in task_handles {
            if let Err(e) = task_handle.await {
                warn!(error = ?e, "actor task panicked during shutdown");
            }
        }

        info!("match directory shutdown complete");
    }
}

impl Default for MatchDirectory {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn dummy_handle(id: &str) -> MatchHandle {
        let (tx, _rx) = mpsc::channel(1);
        MatchHandle::new(tx, id.to_string())
    }

    #[test]
    fn register_claims_both_identities() {
        let directory = MatchDirectory::new();
        directory
            .register(dummy_handle("match_1"), "alice", "bob")
            .unwrap();

        assert!(directory.is_owned("alice"));
        assert!(directory.is_owned("bob"));
        assert!(directory.contains("match_1"));
        assert_eq!(
            directory.find_by_identity("alice").unwrap().id(),
            "match_1"
        );
    }

    #[test]
    fn overlapping_claim_fails_without_side_effects() {
        let directory = MatchDirectory::new();
        directory
            .register(dummy_handle("match_1"), "alice", "bob")
            .unwrap();

        let err = directory
            .register(dummy_handle("match_2"), "carol", "bob")
            .unwrap_err();
        assert_eq!(
            err,
            DirectoryError::IdentityOwned {
                identity: "bob".to_string(),
                match_id: "match_1".to_string(),
            }
        );

        // The failed claim must not leave carol seated or match_2 visible.
        assert!(!directory.is_owned("carol"));
        assert!(!directory.contains("match_2"));
        assert_eq!(directory.find_by_identity("bob").unwrap().id(), "match_1");
    }

    #[test]
    fn removal_is_idempotent() {
        let directory = MatchDirectory::new();
        directory
            .register(dummy_handle("match_1"), "alice", "bob")
            .unwrap();

        assert!(directory.remove("match_1", "alice", "bob"));
        assert!(!directory.remove("match_1", "alice", "bob"));
        assert!(!directory.is_owned("alice"));
        assert!(!directory.is_owned("bob"));
        assert!(directory.is_empty());
    }

    #[test]
    fn stale_removal_keeps_newer_claim() {
        let directory = MatchDirectory::new();
        directory
            .register(dummy_handle("match_1"), "alice", "bob")
            .unwrap();
        directory.remove("match_1", "alice", "bob");

        directory
            .register(dummy_handle("match_2"), "alice", "carol")
            .unwrap();

        // A delayed cleanup of match_1 must not unseat alice from match_2.
        directory.remove("match_1", "alice", "bob");
        assert_eq!(directory.find_by_identity("alice").unwrap().id(), "match_2");
    }

    #[test]
    fn unknown_lookups_return_none() {
        let directory = MatchDirectory::new();
        assert!(directory.get("match_x").is_none());
        assert!(directory.find_by_identity("ghost").is_none());
        assert!(!directory.is_owned("ghost"));
    }

    #[tokio::test]
    async fn shutdown_waits_for_adopted_tasks() {
        let directory = MatchDirectory::new();
        let mut shutdown_rx = directory.subscribe_shutdown();
        let task = tokio::spawn(async move {
            let _ = shutdown_rx.changed().await;
        });
        directory.adopt_task(task).await;

        directory.shutdown().await;
    }
}
