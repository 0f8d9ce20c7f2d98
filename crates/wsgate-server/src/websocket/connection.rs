//! A live WebSocket connection as held by the registry.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use wsgate_core::{ConnectionId, DeliveryError, DeliveryResult};

/// One frame queued for the socket writer.
#[derive(Debug)]
pub struct Outbound {
    /// Frame payload.
    pub frame: Frame,
    /// Resolved by the writer once the frame hit the socket (or failed to).
    pub ack: oneshot::Sender<Result<(), String>>,
}

/// Outbound frame payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 payload, sent as a text frame.
    Text(String),
    /// Anything else, sent as a binary frame.
    Binary(Bytes),
}

impl Frame {
    /// Text frame when `payload` is UTF-8, binary otherwise.
    pub fn from_payload(payload: Bytes) -> Self {
        match std::str::from_utf8(&payload) {
            Ok(text) => Self::Text(text.to_owned()),
            Err(_) => Self::Binary(payload),
        }
    }
}

/// Send-capable handle for one open socket.
#[derive(Debug)]
pub struct ClientConnection {
    /// Connection id (the handshake key).
    pub id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
    /// When the handshake was accepted.
    pub connected_at: Instant,
    send_timeout: Duration,
}

impl ClientConnection {
    /// Handle feeding `tx`.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Outbound>, send_timeout: Duration) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
            send_timeout,
        }
    }

    /// Queue `payload` and wait for the writer to report the socket write.
    ///
    /// A closed queue or a writer that went away without answering means
    /// the socket is gone; a failed write or a stalled queue is a transport
    /// error.
    pub async fn deliver(&self, payload: Bytes) -> DeliveryResult {
        let (ack, written) = oneshot::channel();
        let outbound = Outbound {
            frame: Frame::from_payload(payload),
            ack,
        };

        let sent = tokio::time::timeout(self.send_timeout, async {
            self.tx
                .send(outbound)
                .await
                .map_err(|_| DeliveryError::ConnectionNotFound(self.id.clone()))?;
            written
                .await
                .map_err(|_| DeliveryError::ConnectionNotFound(self.id.clone()))?
                .map_err(DeliveryError::Transport)
        })
        .await;

        sent.unwrap_or_else(|_| Err(DeliveryError::Transport("socket write timed out".into())))
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
