//! WebSocket session lifecycle, from accepted upgrade to disconnect.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, instrument, warn};
use wsgate_core::ConnectionId;
use wsgate_core::delivery::send_json;

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_DISCONNECTIONS_TOTAL};
use crate::server::AppState;

use super::connection::{ClientConnection, Frame, Outbound};
use super::events::Handshake;

/// One inbound frame waiting for dispatch.
#[derive(Debug)]
enum Inbound {
    Text(String),
    Binary(usize),
}

/// Run one accepted connection until the socket closes or the server stops.
///
/// The reader only queues frames; a per-connection worker dispatches them
/// one at a time in arrival order. When the socket closes the registry
/// entry is removed right away, even while a handler is still running, and
/// then the disconnect event is dispatched.
#[instrument(skip_all, fields(connection_id = %connection.id))]
pub async fn run_session(
    socket: WebSocket,
    connection: Arc<ClientConnection>,
    outbound: mpsc::Receiver<Outbound>,
    handshake: Arc<Handshake>,
    state: AppState,
) {
    info!("client connected");
    let (sink, stream) = socket.split();
    let session = state.shutdown.token().child_token();
    let writer = tokio::spawn(write_loop(sink, outbound, session.clone()));

    let (inbound_tx, inbound_rx) = mpsc::channel(state.config.outbound_queue);
    let worker_token = session.child_token();
    let _worker = tokio::spawn(
        dispatch_loop(
            inbound_rx,
            connection.id.clone(),
            Arc::clone(&handshake),
            state.clone(),
            worker_token.clone(),
        )
        .instrument(Span::current()),
    );

    read_loop(stream, &inbound_tx, &session).await;

    // Queued frames are dropped; a handler already running finishes on its
    // own and any reply it sends finds the connection gone.
    worker_token.cancel();
    close_connection(&state, &connection, &handshake).await;
    session.cancel();
    let _ = writer.await;
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = token.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            next = outbound.recv() => {
                let Some(Outbound { frame, ack }) = next else { break };
                let message = match frame {
                    Frame::Text(text) => Message::Text(text.into()),
                    Frame::Binary(data) => Message::Binary(data),
                };
                let result = sink.send(message).await.map_err(|e| e.to_string());
                let failed = result.is_err();
                let _ = ack.send(result);
                if failed {
                    break;
                }
            }
        }
    }
}

async fn read_loop(mut stream: SplitStream<WebSocket>, inbound: &mpsc::Sender<Inbound>, token: &CancellationToken) {
    loop {
        let next = tokio::select! {
            () = token.cancelled() => break,
            next = stream.next() => next,
        };
        let frame = match next {
            Some(Ok(Message::Text(text))) => Inbound::Text(text.as_str().to_owned()),
            Some(Ok(Message::Binary(data))) => Inbound::Binary(data.len()),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(err)) => {
                debug!(error = %err, "socket read failed");
                break;
            }
        };
        match inbound.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("inbound queue full, dropping frame"),
            Err(TrySendError::Closed(_)) => break,
        }
    }
}

async fn dispatch_loop(
    mut inbound: mpsc::Receiver<Inbound>,
    id: ConnectionId,
    handshake: Arc<Handshake>,
    state: AppState,
    token: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => break,
            next = inbound.recv() => next,
        };
        match next {
            Some(Inbound::Text(text)) => handle_text(&state, &id, &handshake, &text).await,
            Some(Inbound::Binary(len)) => {
                warn!(len, "unexpected binary frame");
                notify_failure(&state, &id).await;
            }
            None => break,
        }
    }
}

async fn handle_text(state: &AppState, id: &ConnectionId, handshake: &Handshake, text: &str) {
    let event = handshake.message(id, text);
    match state.dispatcher.dispatch_event(event, Arc::clone(&state.context)).await {
        Ok(response) if response.is_success() => {}
        Ok(response) => {
            warn!(status = response.status_code, "message handler failed");
            notify_failure(state, id).await;
        }
        Err(err) => {
            warn!(error = %err, "message could not be routed");
            notify_failure(state, id).await;
        }
    }
}

/// Best-effort `Internal server error` notice to the connection itself.
pub(crate) async fn notify_failure(state: &AppState, id: &ConnectionId) {
    let notice = json!({
        "message": "Internal server error",
        "connectionId": id,
    });
    if let Err(err) = send_json(state.transport.as_ref(), id, &notice).await {
        warn!(connection_id = %id, error = %err, "failed to notify client");
    }
}

/// Remove the registry entry, then dispatch the disconnect event.
///
/// The disconnect response is logged and otherwise ignored.
pub(crate) async fn close_connection(state: &AppState, connection: &Arc<ClientConnection>, handshake: &Handshake) {
    let id = &connection.id;
    if !state.registry.remove_if_same(id, connection) {
        debug!(connection_id = %id, "registry entry already replaced or removed");
    }
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);

    match state
        .dispatcher
        .dispatch_event(handshake.disconnect(id), Arc::clone(&state.context))
        .await
    {
        Ok(response) if !response.is_success() => {
            warn!(connection_id = %id, status = response.status_code, "disconnect handler failed");
        }
        Ok(_) => {}
        Err(err) => warn!(connection_id = %id, error = %err, "disconnect could not be routed"),
    }
    info!(connection_id = %id, age_ms = connection.age().as_millis() as u64, "client disconnected");
}
