//! Game socket endpoint.
//!
//! Each player holds one WebSocket; the upgrade query names the identity.
//! Events flow out through the connection registry, actions flow in as JSON
//! and are dispatched to the queue or to the player's match actor. A second
//! upgrade for the same identity replaces the first transport, so a closing
//! socket only runs disconnect cleanup while it is still the registered one.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::connection::EventSender;
use crate::matchmaking::JoinOutcome;
use crate::server::{AppState, RuntimeServices};
use crate::session::{ActionError, BOT_ID_PREFIX, ClientAction, MatchHandle, ServerEvent};

/// Longest identity accepted at upgrade time.
const MAX_IDENTITY_LEN: usize = 64;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    identity: String,
}

/// GET /ws?identity=<player>
///
/// Upgrades to the game socket. Rejected before the upgrade when the
/// identity is unusable, so the client sees a plain 400 instead of an
/// immediately-closed socket.
pub async fn ws_connect(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(reason) = validate_identity(&params.identity) {
        return (StatusCode::BAD_REQUEST, reason).into_response();
    }
    debug!(identity = %params.identity, peer = %addr, "Socket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, params.identity, state))
}

fn validate_identity(identity: &str) -> Result<(), &'static str> {
    if identity.is_empty() || identity.len() > MAX_IDENTITY_LEN {
        return Err("identity must be 1-64 characters");
    }
    if identity.starts_with(BOT_ID_PREFIX) {
        return Err("identity prefix is reserved");
    }
    Ok(())
}

async fn handle_socket(socket: WebSocket, identity: String, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let services = state.services;
    services.connections.register(&identity, event_tx.clone());

    // A reconnect into a live match replays the current view.
    if let Some(handle) = services.matches.directory().find_by_identity(&identity)
        && let Ok(snapshot) = handle.snapshot_for(&identity).await
    {
        let _ = event_tx.send(ServerEvent::GameState { state: snapshot });
    }

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(identity, error = %e, "Failed to encode event"),
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_message(&services, &identity, &event_tx, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/pong and binary frames need no application action.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(identity, error = %e, "Socket error");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup belongs to the transport that is still registered. A reconnect
    // swapped us out already when unregister returns false.
    if services.connections.unregister(&identity, &event_tx) {
        services.queue.leave(&identity).await;
        if let Some(handle) = services.matches.directory().find_by_identity(&identity)
            && let Err(e) = handle.report_disconnect(&identity).await
        {
            debug!(identity, error = %e, "Disconnect report not delivered");
        }
        debug!(identity, "Socket closed");
    }
}

async fn handle_message(
    services: &RuntimeServices,
    identity: &str,
    event_tx: &EventSender,
    text: &str,
) {
    let action: ClientAction = match serde_json::from_str(text) {
        Ok(action) => action,
        Err(e) => {
            reject(event_tx, format!("unparseable action: {e}"));
            return;
        }
    };
    handle_action(services, identity, event_tx, action).await;
}

async fn handle_action(
    services: &RuntimeServices,
    identity: &str,
    event_tx: &EventSender,
    action: ClientAction,
) {
    match action {
        ClientAction::JoinQueue => {
            if services.matches.directory().is_owned(identity) {
                reject(event_tx, "already in a match".to_string());
                return;
            }
            let score = match services.scores.score(identity).await {
                Ok(score) => score,
                Err(e) => {
                    warn!(identity, error = %e, "Score lookup failed, queueing at zero");
                    0
                }
            };
            let (JoinOutcome::Joined { position } | JoinOutcome::AlreadyQueued { position }) =
                services.queue.join(identity, score).await;
            let _ = event_tx.send(ServerEvent::QueueJoined { position });
        }
        ClientAction::LeaveQueue => {
            services.queue.leave(identity).await;
            let _ = event_tx.send(ServerEvent::QueueLeft);
        }
        ClientAction::PlayBot => {
            services.queue.leave(identity).await;
            if let Err(e) = services.matches.create_bot_session(identity).await {
                reject(event_tx, e.to_string());
            }
        }
        ClientAction::SubmitMove {
            slot,
            revealed_value,
            combination,
        } => {
            let Some(handle) = in_match(services, event_tx, identity) else {
                return;
            };
            reply(
                event_tx,
                handle
                    .submit_move(identity, slot, revealed_value, combination)
                    .await,
            );
        }
        ClientAction::SubmitSwap {
            pos_a,
            pos_b,
            combination,
        } => {
            let Some(handle) = in_match(services, event_tx, identity) else {
                return;
            };
            reply(
                event_tx,
                handle.submit_swap(identity, pos_a, pos_b, combination).await,
            );
        }
        ClientAction::SubmitEmoji { emoji_index } => {
            let Some(handle) = in_match(services, event_tx, identity) else {
                return;
            };
            reply(event_tx, handle.submit_emoji(identity, emoji_index).await);
        }
        ClientAction::CancelLobby => {
            let Some(handle) = in_match(services, event_tx, identity) else {
                return;
            };
            reply(event_tx, handle.cancel_lobby(identity).await);
        }
        ClientAction::ReportDisconnect => {
            let Some(handle) = in_match(services, event_tx, identity) else {
                return;
            };
            reply(event_tx, handle.report_disconnect(identity).await);
        }
    }
}

/// Resolve the sender's match, rejecting the action when there is none.
fn in_match(
    services: &RuntimeServices,
    event_tx: &EventSender,
    identity: &str,
) -> Option<MatchHandle> {
    let handle = services.matches.directory().find_by_identity(identity);
    if handle.is_none() {
        reject(event_tx, "no active match".to_string());
    }
    handle
}

fn reply(event_tx: &EventSender, result: Result<(), ActionError>) {
    if let Err(e) = result {
        reject(event_tx, e.to_string());
    }
}

fn reject(event_tx: &EventSender, reason: String) {
    let _ = event_tx.send(ServerEvent::Rejected { reason });
}
