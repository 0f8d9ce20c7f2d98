//! Handler arguments and responses.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wsgate_core::delivery::send_json;
use wsgate_core::{ConnectionId, DeliveryResult, InvocationContext, NormalizedEvent, TransportEvent};

/// Response returned to the transport for one event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    /// HTTP-style status; 200 is success.
    pub status_code: u16,
    /// Optional response body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RouteResponse {
    /// A bare response with `status_code`.
    pub fn status(status_code: u16) -> Self {
        Self {
            status_code,
            body: None,
        }
    }

    /// `{ statusCode: 200 }`.
    pub fn ok() -> Self {
        Self::status(200)
    }

    /// Attach a body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Whether the status is 200.
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Everything a route handler receives.
#[derive(Clone)]
pub struct RouteArgs {
    /// Connection the event belongs to.
    pub id: ConnectionId,
    /// The normalized event.
    pub event: NormalizedEvent,
    /// The transport event as received, before route-field stripping.
    pub raw: Arc<TransportEvent>,
    /// Invocation context (deadline and delivery).
    pub context: Arc<dyn InvocationContext>,
}

impl RouteArgs {
    /// Decoded message payload (`{}` for lifecycle events).
    pub fn message(&self) -> &Value {
        &self.event.payload
    }

    /// Route key of a message event.
    pub fn route_key(&self) -> Option<&str> {
        self.event.route_key()
    }

    /// Deliver `payload` as JSON to `connection_id` through the context's transport.
    pub async fn post_to_connection(
        &self,
        connection_id: &ConnectionId,
        payload: &Value,
    ) -> DeliveryResult {
        let transport = self.context.transport();
        send_json(transport.as_ref(), connection_id, payload).await
    }

    /// Deliver `payload` back to the connection that produced this event.
    pub async fn reply(&self, payload: &Value) -> DeliveryResult {
        self.post_to_connection(&self.id, payload).await
    }
}

impl fmt::Debug for RouteArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteArgs")
            .field("id", &self.id)
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}
