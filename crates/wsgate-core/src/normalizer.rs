//! Event normalizer: transport event → [`NormalizedEvent`].
//!
//! Resolution rules:
//! - Event kind comes from `requestContext.eventType`; anything other than
//!   `CONNECT` / `DISCONNECT` / `MESSAGE` is [`GatewayError::UnknownEventKind`].
//! - Message bodies are base64-decoded only when the transport says so,
//!   then parsed as JSON. Absent, empty or malformed bodies become `{}`.
//! - The message route key is the configured payload field when it holds
//!   a non-empty string, else the transport's own route key when it names a
//!   custom route, else [`DEFAULT_ROUTE`]. The route field is stripped from
//!   the payload handed onwards.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::constants::{DEFAULT_ROUTE, DEFAULT_ROUTE_KEY_FIELD};
use crate::context::InvocationContext;
use crate::errors::{GatewayError, Result};
use crate::events::{EventKind, NormalizedEvent, TransportEvent};
use crate::ids::ConnectionId;

/// Turns transport events into routable events.
#[derive(Clone, Debug)]
pub struct EventNormalizer {
    route_key_field: String,
}

impl EventNormalizer {
    /// Normalizer reading the route key from `route_key_field`.
    pub fn new(route_key_field: impl Into<String>) -> Self {
        Self {
            route_key_field: route_key_field.into(),
        }
    }

    /// Payload field the route key is read from.
    pub fn route_key_field(&self) -> &str {
        &self.route_key_field
    }

    /// Normalize one transport event.
    pub fn normalize(
        &self,
        event: &TransportEvent,
        context: &dyn InvocationContext,
    ) -> Result<NormalizedEvent> {
        let ctx = &event.request_context;
        let kind: EventKind = ctx.event_type.parse()?;
        if ctx.connection_id.is_empty() {
            return Err(GatewayError::MissingConnectionId);
        }
        let connection_id = ConnectionId::new(ctx.connection_id.clone());

        let (route_key, payload) = match kind {
            EventKind::Connect | EventKind::Disconnect => (None, empty_object()),
            EventKind::Message => {
                let mut payload = match decode_body(event.body.as_deref(), event.is_base64_encoded) {
                    Ok(value) => value,
                    Err(err) => {
                        warn!(connection_id = %connection_id, error = %err, "undecodable message body, using empty payload");
                        empty_object()
                    }
                };
                let route = self.resolve_route(&mut payload, &ctx.route_key);
                (Some(route), payload)
            }
        };

        debug!(
            connection_id = %connection_id,
            kind = %kind,
            route = route_key.as_deref().unwrap_or(""),
            "normalized transport event"
        );

        Ok(NormalizedEvent {
            connection_id,
            kind,
            route_key,
            payload,
            deadline: context.deadline(),
            headers: event.multi_value_headers.clone(),
            query: event.multi_value_query_string_parameters.clone(),
        })
    }

    fn resolve_route(&self, payload: &mut Value, transport_route: &str) -> String {
        if let Some(map) = payload.as_object_mut() {
            let named = map
                .get(&self.route_key_field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned);
            if let Some(route) = named {
                let _ = map.remove(&self.route_key_field);
                return route;
            }
        }
        if !transport_route.is_empty() && !transport_route.starts_with('$') {
            return transport_route.to_owned();
        }
        DEFAULT_ROUTE.to_owned()
    }
}

impl Default for EventNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_ROUTE_KEY_FIELD)
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Decode a message body into structured data.
///
/// Absent or blank bodies and a literal `null` decode to `{}`.
pub fn decode_body(body: Option<&str>, is_base64_encoded: bool) -> Result<Value> {
    let Some(body) = body else {
        return Ok(empty_object());
    };
    let text = if is_base64_encoded {
        let bytes = STANDARD.decode(body.trim())?;
        String::from_utf8(bytes).map_err(|e| GatewayError::Decode(e.to_string()))?
    } else {
        body.to_owned()
    };
    if text.trim().is_empty() {
        return Ok(empty_object());
    }
    match serde_json::from_str::<Value>(&text)? {
        Value::Null => Ok(empty_object()),
        value => Ok(value),
    }
}
