//! Execution context handed to every invocation.

use std::sync::Arc;
use std::time::Duration;

use crate::constants::DEFAULT_DEADLINE;
use crate::delivery::Transport;

/// What the invocation environment exposes to normalization and handlers.
///
/// The managed platform reports a real remaining-time budget; the local
/// emulator reports none and the fixed default applies.
pub trait InvocationContext: Send + Sync {
    /// Time left before the environment reclaims the invocation, if known.
    fn remaining_time(&self) -> Option<Duration>;

    /// Delivery capability addressing connections by id.
    fn transport(&self) -> Arc<dyn Transport>;

    /// Remaining time, or [`DEFAULT_DEADLINE`] when the environment gives no hint.
    fn deadline(&self) -> Duration {
        self.remaining_time().unwrap_or(DEFAULT_DEADLINE)
    }
}
