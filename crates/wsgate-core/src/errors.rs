//! Error taxonomy for event normalization.
//!
//! Only [`GatewayError::UnknownEventKind`] and
//! [`GatewayError::MissingConnectionId`] abort an invocation. Body decode
//! failures are reported as [`GatewayError::Decode`] to the normalizer's
//! logging path and then replaced by an empty payload; they never reach
//! a handler. Delivery failures live in [`crate::delivery::DeliveryError`]
//! and are returned as values.

use thiserror::Error;

/// Errors raised while turning a transport event into a routable event.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The transport reported an event kind the gateway cannot route.
    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),

    /// The transport event carried no connection id.
    #[error("transport event has no connection id")]
    MissingConnectionId,

    /// The message body could not be decoded into structured data.
    #[error("failed to decode message body: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Whether this error must abort the current invocation.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<base64::DecodeError> for GatewayError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result type for normalization operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
