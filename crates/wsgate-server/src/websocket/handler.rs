//! WebSocket upgrade handler.
//!
//! The connect event is dispatched before the upgrade is accepted: a
//! non-200 connect response becomes the handshake's HTTP status and the
//! socket is never opened.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tracing::{info, warn};
use wsgate_core::ConnectionId;

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_HANDSHAKES_REJECTED_TOTAL};
use crate::server::AppState;

use super::connection::ClientConnection;
use super::events::Handshake;
use super::session::{close_connection, run_session};

/// Accept a WebSocket on any path not claimed by another route.
///
/// Plain HTTP requests get 404. Once shutdown has begun every request
/// gets 503 and no connect event is dispatched.
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) if headers.contains_key(header::UPGRADE) => return rejection.into_response(),
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    let Some(key) = headers
        .get(header::SEC_WEBSOCKET_KEY)
        .and_then(|v| v.to_str().ok())
        .filter(|k| !k.is_empty())
    else {
        return (StatusCode::BAD_REQUEST, "missing Sec-WebSocket-Key").into_response();
    };
    let id = ConnectionId::new(key);
    let handshake = Arc::new(Handshake::capture(&headers, &uri));

    let response = match state
        .dispatcher
        .dispatch_event(handshake.connect(&id), Arc::clone(&state.context))
        .await
    {
        Ok(response) => response,
        Err(err) => {
            warn!(connection_id = %id, error = %err, "connect could not be routed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if !response.is_success() {
        counter!(WS_HANDSHAKES_REJECTED_TOTAL, "status" => response.status_code.to_string()).increment(1);
        info!(connection_id = %id, status = response.status_code, "connect refused");
        let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return status.into_response();
    }

    let (tx, rx) = mpsc::channel(state.config.outbound_queue);
    let connection = Arc::new(ClientConnection::new(id.clone(), tx, state.config.send_timeout));
    if state.registry.register(id.clone(), Arc::clone(&connection)).is_some() {
        warn!(connection_id = %id, "connection id reused, replacing previous socket");
    }
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let failed = (state.clone(), Arc::clone(&connection), Arc::clone(&handshake));
    upgrade
        .max_message_size(state.config.max_message_size)
        .on_failed_upgrade(move |err| {
            warn!(error = %err, "websocket upgrade failed");
            let (state, connection, handshake) = failed;
            let _ = tokio::spawn(async move {
                close_connection(&state, &connection, &handshake).await;
            });
        })
        .on_upgrade(move |socket| run_session(socket, connection, rx, handshake, state))
}
