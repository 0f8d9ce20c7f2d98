//! Synthesizes managed-platform events from a WebSocket handshake.

use std::collections::BTreeMap;

use axum::extract::Query;
use axum::http::{HeaderMap, Uri};
use wsgate_core::{ConnectionId, HeaderValue, MultiValue, TransportEvent};

/// What the handshake contributed to every event of a connection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Handshake {
    /// Handshake headers, each value split into its list items.
    pub headers: Option<MultiValue>,
    /// Query-string parameters, repeated keys collected into lists.
    pub query: Option<MultiValue>,
}

impl Handshake {
    /// Capture headers and query parameters from the upgrade request.
    pub fn capture(headers: &HeaderMap, uri: &Uri) -> Self {
        Self {
            headers: header_map(headers),
            query: query_map(uri),
        }
    }

    /// Connect event for `id`.
    pub fn connect(&self, id: &ConnectionId) -> TransportEvent {
        self.decorate(TransportEvent::connect(id))
    }

    /// Disconnect event for `id`.
    pub fn disconnect(&self, id: &ConnectionId) -> TransportEvent {
        self.decorate(TransportEvent::disconnect(id))
    }

    /// Message event for `id` carrying a text frame.
    pub fn message(&self, id: &ConnectionId, text: &str) -> TransportEvent {
        self.decorate(TransportEvent::message(id, text))
    }

    fn decorate(&self, event: TransportEvent) -> TransportEvent {
        event
            .with_headers(self.headers.clone())
            .with_query(self.query.clone())
    }
}

/// Header map with every value split on `,` (`;` for `cookie`).
///
/// Values are always lists; non-UTF-8 values are skipped.
pub fn header_map(headers: &HeaderMap) -> Option<MultiValue> {
    let mut out = MultiValue::new();
    for name in headers.keys() {
        let separator = if name.as_str() == "cookie" { ';' } else { ',' };
        let values: Vec<String> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(separator))
            .map(|item| item.trim().to_owned())
            .collect();
        if !values.is_empty() {
            let _ = out.insert(name.as_str().to_owned(), HeaderValue::Many(values));
        }
    }
    (!out.is_empty()).then_some(out)
}

/// Query parameters; a key given once maps to a string, repeated keys to a list.
pub fn query_map(uri: &Uri) -> Option<MultiValue> {
    let Ok(Query(pairs)) = Query::<Vec<(String, String)>>::try_from_uri(uri) else {
        return None;
    };
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in pairs {
        grouped.entry(key).or_default().push(value);
    }
    let out: MultiValue = grouped
        .into_iter()
        .map(|(key, mut values)| {
            let value = if values.len() == 1 {
                HeaderValue::One(values.remove(0))
            } else {
                HeaderValue::Many(values)
            };
            (key, value)
        })
        .collect();
    (!out.is_empty()).then_some(out)
}
