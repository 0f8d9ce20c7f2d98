//! Delivery straight to locally held sockets.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use wsgate_core::{
    ConnectionId, ConnectionRegistry, DeliveryError, DeliveryResult, InvocationContext, Transport,
    record_failure,
};

use crate::websocket::connection::ClientConnection;

/// Registry of open sockets, keyed by connection id.
pub type SocketRegistry = ConnectionRegistry<ClientConnection>;

/// Resolves the connection in the registry and writes to it.
#[derive(Clone)]
pub struct LocalTransport {
    registry: Arc<SocketRegistry>,
}

impl LocalTransport {
    /// Transport over `registry`.
    pub fn new(registry: Arc<SocketRegistry>) -> Self {
        Self { registry }
    }

    /// The registry deliveries resolve against.
    pub fn registry(&self) -> &Arc<SocketRegistry> {
        &self.registry
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn send(&self, connection_id: &ConnectionId, payload: Bytes) -> DeliveryResult {
        let Some(connection) = self.registry.lookup(connection_id) else {
            let err = DeliveryError::ConnectionNotFound(connection_id.clone());
            record_failure(&err);
            return Err(err);
        };

        let result = connection.deliver(payload).await;
        if let Err(err) = &result {
            record_failure(err);
            // The id may already belong to a newer socket.
            if err.is_gone() && self.registry.remove_if_same(connection_id, &connection) {
                debug!(connection_id = %connection_id, "evicted closed connection");
            }
        }
        result
    }
}

/// Invocation context for emulated events: no remaining-time hint, so the
/// configured default deadline applies.
#[derive(Clone)]
pub struct LocalContext {
    transport: Arc<LocalTransport>,
    default_deadline: Duration,
}

impl LocalContext {
    /// Context delivering through `transport`.
    pub fn new(transport: Arc<LocalTransport>, default_deadline: Duration) -> Self {
        Self {
            transport,
            default_deadline,
        }
    }
}

impl InvocationContext for LocalContext {
    fn remaining_time(&self) -> Option<Duration> {
        None
    }

    fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    fn deadline(&self) -> Duration {
        self.default_deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use crate::websocket::connection::{Frame, Outbound};

    fn open(registry: &SocketRegistry, id: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(8);
        let conn = Arc::new(ClientConnection::new(ConnectionId::from(id), tx, Duration::from_secs(1)));
        let _ = registry.register(ConnectionId::from(id), Arc::clone(&conn));
        (conn, rx)
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let transport = LocalTransport::new(Arc::new(SocketRegistry::new()));
        let err = transport
            .send(&ConnectionId::from("nobody"), Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err, DeliveryError::ConnectionNotFound(ConnectionId::from("nobody")));
    }

    #[tokio::test]
    async fn delivers_to_registered_socket() {
        let registry = Arc::new(SocketRegistry::new());
        let (_conn, mut rx) = open(&registry, "abc123");
        let transport = LocalTransport::new(Arc::clone(&registry));

        let writer = tokio::spawn(async move {
            let out = rx.recv().await.unwrap();
            let _ = out.ack.send(Ok(()));
            out.frame
        });
        transport
            .send(&ConnectionId::from("abc123"), Bytes::from_static(b"{\"x\":1}"))
            .await
            .unwrap();
        assert_eq!(writer.await.unwrap(), Frame::Text("{\"x\":1}".into()));
    }

    #[tokio::test]
    async fn closed_socket_is_evicted() {
        let registry = Arc::new(SocketRegistry::new());
        let (_conn, rx) = open(&registry, "gone");
        drop(rx);
        let transport = LocalTransport::new(Arc::clone(&registry));

        let err = transport
            .send(&ConnectionId::from("gone"), Bytes::new())
            .await
            .unwrap_err();
        assert!(err.is_gone());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn write_failure_keeps_entry() {
        let registry = Arc::new(SocketRegistry::new());
        let (_conn, mut rx) = open(&registry, "flaky");
        let transport = LocalTransport::new(Arc::clone(&registry));
        let _writer = tokio::spawn(async move {
            let out = rx.recv().await.unwrap();
            let _ = out.ack.send(Err("reset".into()));
        });

        let err = transport
            .send(&ConnectionId::from("flaky"), Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(err, DeliveryError::Transport("reset".into()));
        assert!(registry.contains(&ConnectionId::from("flaky")));
    }

    #[test]
    fn context_uses_configured_deadline() {
        let transport = Arc::new(LocalTransport::new(Arc::new(SocketRegistry::new())));
        let ctx = LocalContext::new(transport, Duration::from_millis(1234));
        assert!(ctx.remaining_time().is_none());
        assert_eq!(ctx.deadline(), Duration::from_millis(1234));
        assert_eq!(ctx.transport().name(), "local");
    }
}
