//! Invocation context for managed-platform invocations.

use std::sync::Arc;
use std::time::{Duration, Instant};

use wsgate_core::{InvocationContext, Transport};

/// Context of one managed invocation: a fixed deadline and out-of-band delivery.
#[derive(Clone)]
pub struct ManagedContext {
    deadline_at: Option<Instant>,
    transport: Arc<dyn Transport>,
}

impl ManagedContext {
    /// Context whose invocation ends `remaining` from now (or never, if `None`).
    pub fn new(transport: Arc<dyn Transport>, remaining: Option<Duration>) -> Self {
        Self {
            deadline_at: remaining.map(|r| Instant::now() + r),
            transport,
        }
    }
}

impl InvocationContext for ManagedContext {
    fn remaining_time(&self) -> Option<Duration> {
        self.deadline_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }
}
