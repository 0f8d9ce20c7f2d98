//! Transport event shape and the normalized event.
//!
//! [`TransportEvent`] is the managed platform's wire format. The local
//! emulator synthesizes the same structure so there is exactly one inbound
//! shape to normalize. [`NormalizedEvent`] is what the dispatcher sees.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{CONNECT_ROUTE, DEFAULT_ROUTE, DISCONNECT_ROUTE};
use crate::errors::GatewayError;
use crate::ids::ConnectionId;

/// A header or query value: one string, or every value given for the key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    /// A key that appeared once.
    One(String),
    /// A key that appeared several times (or a split list value).
    Many(Vec<String>),
}

impl HeaderValue {
    /// The first value for the key, if any.
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::One(v) => Some(v),
            Self::Many(vs) => vs.first().map(String::as_str),
        }
    }

    /// All values for the key.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::One(v) => vec![v.as_str()],
            Self::Many(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

/// Multi-valued header / query-string map.
pub type MultiValue = BTreeMap<String, HeaderValue>;

/// Routing metadata attached by the transport.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Route key chosen by the transport (`$connect`, `$disconnect`, `$default`, or custom).
    #[serde(default)]
    pub route_key: String,
    /// Raw event kind marker (`CONNECT`, `DISCONNECT`, `MESSAGE`).
    #[serde(default)]
    pub event_type: String,
    /// Transport-assigned connection id.
    #[serde(default)]
    pub connection_id: String,
    /// Public domain of the managed API, used to address out-of-band delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
    /// Deployment stage of the managed API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

/// Inbound event in the managed platform's shape.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportEvent {
    /// Routing metadata.
    pub request_context: RequestContext,
    /// Headers captured at handshake time.
    #[serde(default)]
    pub multi_value_headers: Option<MultiValue>,
    /// Query-string parameters captured at handshake time.
    #[serde(default)]
    pub multi_value_query_string_parameters: Option<MultiValue>,
    /// Message body (message events only).
    #[serde(default)]
    pub body: Option<String>,
    /// Whether `body` is base64 encoded.
    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl TransportEvent {
    fn with_kind(connection_id: &ConnectionId, route_key: &str, kind: EventKind) -> Self {
        Self {
            request_context: RequestContext {
                route_key: route_key.to_owned(),
                event_type: kind.as_str().to_owned(),
                connection_id: connection_id.to_string(),
                ..RequestContext::default()
            },
            ..Self::default()
        }
    }

    /// A connect event for `connection_id`.
    pub fn connect(connection_id: &ConnectionId) -> Self {
        Self::with_kind(connection_id, CONNECT_ROUTE, EventKind::Connect)
    }

    /// A disconnect event for `connection_id`.
    pub fn disconnect(connection_id: &ConnectionId) -> Self {
        Self::with_kind(connection_id, DISCONNECT_ROUTE, EventKind::Disconnect)
    }

    /// A message event carrying a plain-text body.
    pub fn message(connection_id: &ConnectionId, body: impl Into<String>) -> Self {
        let mut event = Self::with_kind(connection_id, DEFAULT_ROUTE, EventKind::Message);
        event.body = Some(body.into());
        event
    }

    /// Attach handshake headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Option<MultiValue>) -> Self {
        self.multi_value_headers = headers;
        self
    }

    /// Attach handshake query parameters.
    #[must_use]
    pub fn with_query(mut self, query: Option<MultiValue>) -> Self {
        self.multi_value_query_string_parameters = query;
        self
    }
}

/// The three event kinds the gateway can route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A socket is opening.
    Connect,
    /// A socket has closed.
    Disconnect,
    /// A data frame arrived.
    Message,
}

impl EventKind {
    /// Wire marker for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Self::Connect),
            "DISCONNECT" => Ok(Self::Disconnect),
            "MESSAGE" => Ok(Self::Message),
            other => Err(GatewayError::UnknownEventKind(other.to_owned())),
        }
    }
}

/// A transport event resolved into routable form.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedEvent {
    /// Connection the event belongs to.
    pub connection_id: ConnectionId,
    /// Resolved kind.
    pub kind: EventKind,
    /// Route key; `Some` only for message events.
    pub route_key: Option<String>,
    /// Decoded payload (empty object when absent or malformed).
    pub payload: Value,
    /// Processing time left before the environment reclaims the invocation.
    pub deadline: Duration,
    /// Handshake headers.
    pub headers: Option<MultiValue>,
    /// Handshake query parameters.
    pub query: Option<MultiValue>,
}

impl NormalizedEvent {
    /// Route key for message events, `None` for lifecycle events.
    pub fn route_key(&self) -> Option<&str> {
        self.route_key.as_deref()
    }
}
