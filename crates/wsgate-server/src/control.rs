//! Connections control plane: `POST|PUT /@connections/{id}`.
//!
//! The local stand-in for the managed platform's out-of-band delivery
//! call. The raw request body is written to the socket as one frame.
//!
//! | Status | Meaning |
//! |--------|---------|
//! | 200 | delivered |
//! | 404 | no connection id in the path |
//! | 410 | no such connection |
//! | 500 | the socket write failed |

use axum::extract::{Path, State};
use axum::http::StatusCode;
use bytes::Bytes;
use metrics::counter;
use tracing::{debug, warn};
use wsgate_core::{ConnectionId, DeliveryError, Transport};

use crate::metrics::CONTROL_REQUESTS_TOTAL;
use crate::server::AppState;

/// Forward the request body to the connection named in the path.
pub async fn post_to_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> StatusCode {
    let status = if id.is_empty() {
        StatusCode::NOT_FOUND
    } else {
        let id = ConnectionId::new(id);
        match state.transport.send(&id, body).await {
            Ok(()) => StatusCode::OK,
            Err(DeliveryError::ConnectionNotFound(_)) => {
                debug!(connection_id = %id, "control plane: connection gone");
                StatusCode::GONE
            }
            Err(DeliveryError::Transport(err)) => {
                warn!(connection_id = %id, error = %err, "control plane: send failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    };
    counter!(CONTROL_REQUESTS_TOTAL, "status" => status.as_u16().to_string()).increment(1);
    status
}

/// `/@connections/` with no id.
pub async fn missing_connection_id() -> StatusCode {
    counter!(CONTROL_REQUESTS_TOTAL, "status" => "404").increment(1);
    StatusCode::NOT_FOUND
}
