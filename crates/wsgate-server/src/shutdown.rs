//! Graceful shutdown via `CancellationToken`.
//!
//! One token fans out to the HTTP server, every session reader and every
//! session writer. Sessions close their sockets when it fires.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long to wait for sessions to drain before giving up.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinates emulator shutdown.
#[derive(Clone, Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Coordinator that has not fired yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is cancelled when shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Begin shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fire the token and wait up to `timeout` for `handles`.
    ///
    /// Returns `false` when the wait timed out.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        info!(task_count = handles.len(), timeout_ms = timeout.as_millis() as u64, "draining emulator");

        let drained = tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_ok();
        if !drained {
            warn!(?timeout, "emulator did not drain in time");
        }
        drained
    }
}
