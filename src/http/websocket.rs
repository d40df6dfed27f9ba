//! WebSocket front door for the chat relay.
//!
//! # Responsibilities
//! - Reserve a relay session slot before accepting the upgrade
//! - Complete the upgrade handshake with the client
//! - Hand the socket to the relay with the current upstream target
//!
//! # Design Decisions
//! - Over the session limit the upgrade is refused with 503
//! - The target is read once per session; config reloads only affect new sessions

use std::net::SocketAddr;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::http::server::AppState;
use crate::relay::{Connection, SessionSnapshot, Side};

/// `GET /api/ws/chat`
pub async fn chat(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    upgrade: WebSocketUpgrade,
) -> Response {
    let Some(slot) = state.relay.registry().try_reserve() else {
        tracing::warn!(
            peer = %peer,
            max_sessions = state.relay.registry().max_sessions(),
            "Relay session limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many chat sessions").into_response();
    };

    let runtime = state.inner.load_full();
    let relay = state.relay.clone();

    upgrade
        .max_message_size(runtime.max_message_bytes)
        .on_failed_upgrade(move |e| {
            tracing::warn!(peer = %peer, error = %e, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| async move {
            tracing::debug!(peer = %peer, "Client connected");
            let downstream = Connection::from_axum(Side::Downstream, socket);
            let report = relay.run(slot, downstream, &runtime.relay_target).await;
            tracing::debug!(
                peer = %peer,
                session_id = %report.id,
                outcome = report.end.as_str(),
                "Client session finished"
            );
        })
}

/// `GET /api/sessions`
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSnapshot>> {
    Json(state.relay.registry().snapshot())
}
