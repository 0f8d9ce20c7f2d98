//! Server error types.

use thiserror::Error;

/// Errors starting or running the emulator.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address (`host:port`).
        addr: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Other I/O failure.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
