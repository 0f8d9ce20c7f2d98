//! Delivery abstraction: "send payload to connection id".
//!
//! Both transports implement [`Transport`]. Failures are returned as
//! [`DeliveryError`] values, never raised, so callers decide what a failure means.

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use serde_json::Value;
use thiserror::Error;

use crate::ids::ConnectionId;

/// Why a delivery failed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The target connection no longer exists. Recoverable: evict any local entry.
    #[error("connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    /// The transport failed to carry the payload.
    #[error("transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    /// Stable reason tag (`connection-not-found` / `transport-error`).
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ConnectionNotFound(_) => "connection-not-found",
            Self::Transport(_) => "transport-error",
        }
    }

    /// Whether the error signals a vanished connection.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::ConnectionNotFound(_))
    }
}

/// Outcome of a single delivery.
pub type DeliveryResult = Result<(), DeliveryError>;

/// Capability to push a payload to a connection addressed by id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs and metrics (`local`, `managed`).
    fn name(&self) -> &'static str;

    /// Deliver raw bytes as one frame.
    async fn send(&self, connection_id: &ConnectionId, payload: Bytes) -> DeliveryResult;
}

/// Count a failed delivery under `delivery_failures_total{reason}`.
///
/// Called by [`Transport`] implementations on every failed send.
pub fn record_failure(err: &DeliveryError) {
    counter!("delivery_failures_total", "reason" => err.reason()).increment(1);
}

/// Serialize `payload` as JSON and deliver it.
pub async fn send_json(
    transport: &dyn Transport,
    connection_id: &ConnectionId,
    payload: &Value,
) -> DeliveryResult {
    let bytes = serde_json::to_vec(payload).map_err(|e| DeliveryError::Transport(e.to_string()))?;
    transport.send(connection_id, Bytes::from(bytes)).await
}
