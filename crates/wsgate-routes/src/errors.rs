//! Handler error type.

use thiserror::Error;
use wsgate_core::DeliveryError;

/// Failure reported by an application route handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The handler refused the event with a specific status.
    #[error("rejected ({status_code}): {message}")]
    Rejected {
        /// Status returned to the transport.
        status_code: u16,
        /// Human-readable reason.
        message: String,
    },

    /// Unexpected handler failure.
    #[error("internal handler error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Rejected`].
    pub fn rejected(status_code: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status_code,
            message: message.into(),
        }
    }

    /// Status reported to the transport for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Rejected { status_code, .. } => *status_code,
            Self::Internal(_) => 500,
        }
    }
}

impl From<DeliveryError> for HandlerError {
    fn from(err: DeliveryError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result type returned by route handlers.
pub type HandlerResult = std::result::Result<crate::types::RouteResponse, HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(HandlerError::rejected(401, "nope").status_code(), 401);
        assert_eq!(HandlerError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn display() {
        let err = HandlerError::rejected(403, "forbidden");
        assert_eq!(err.to_string(), "rejected (403): forbidden");
    }

    #[test]
    fn delivery_error_is_internal() {
        let err: HandlerError = DeliveryError::Transport("reset".into()).into();
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("reset"));
    }
}
