//! Rollduel - Real-time match server for a two-player turn-based dice duel.

// ============================================================================
// Core Infrastructure
// ============================================================================

pub mod build_info;
pub mod config;

// ============================================================================
// Server & Transport
// ============================================================================

pub mod connection;
pub mod handlers;
pub mod server;

// ============================================================================
// Domain
// ============================================================================

pub mod matchmaking;
pub mod score;
pub mod session;
