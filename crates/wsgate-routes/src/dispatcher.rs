//! Route dispatcher.
//!
//! Selects exactly one handler per event and always produces a
//! [`RouteResponse`]: handler errors become their status, panics become
//! 500, and deadline overruns become 504.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use metrics::{counter, histogram};
use tracing::{debug, error, warn};
use wsgate_core::constants::{CONNECT_ROUTE, DISCONNECT_ROUTE};
use wsgate_core::{EventKind, EventNormalizer, InvocationContext, NormalizedEvent, TransportEvent};

use crate::table::{RouteHandler, RouteTable};
use crate::types::{RouteArgs, RouteResponse};

/// Status reported when a handler outlives the event deadline.
pub const TIMEOUT_STATUS: u16 = 504;

/// Normalizes transport events and runs the selected route handler.
#[derive(Clone)]
pub struct Dispatcher {
    normalizer: EventNormalizer,
    table: Arc<RouteTable>,
}

impl Dispatcher {
    /// Dispatcher over `table`, normalizing with `normalizer`.
    pub fn new(normalizer: EventNormalizer, table: RouteTable) -> Self {
        Self {
            normalizer,
            table: Arc::new(table),
        }
    }

    /// The normalizer in use.
    pub fn normalizer(&self) -> &EventNormalizer {
        &self.normalizer
    }

    /// The route table in use.
    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Normalize `raw` and dispatch it.
    ///
    /// Fails only when the event cannot be routed at all (unknown kind,
    /// missing connection id).
    pub async fn dispatch_event(
        &self,
        raw: TransportEvent,
        context: Arc<dyn InvocationContext>,
    ) -> wsgate_core::Result<RouteResponse> {
        let event = self.normalizer.normalize(&raw, context.as_ref())?;
        Ok(self.dispatch(event, Arc::new(raw), context).await)
    }

    /// Dispatch an already normalized event.
    pub async fn dispatch(
        &self,
        event: NormalizedEvent,
        raw: Arc<TransportEvent>,
        context: Arc<dyn InvocationContext>,
    ) -> RouteResponse {
        let selected = match event.kind {
            EventKind::Connect => (CONNECT_ROUTE.to_owned(), self.table.connect_handler()),
            EventKind::Disconnect => (DISCONNECT_ROUTE.to_owned(), self.table.disconnect_handler()),
            EventKind::Message => {
                let key = event.route_key().unwrap_or_default();
                match self.table.message_handler(key) {
                    Some((matched, handler)) => (matched, Some(handler)),
                    None => (key.to_owned(), None),
                }
            }
        };
        let (route, handler) = selected;

        let Some(handler) = handler else {
            debug!(connection_id = %event.connection_id, route = %route, "no handler registered, acknowledging");
            counter!("route_dispatch_total", "route" => route, "status" => "200").increment(1);
            return RouteResponse::ok();
        };

        let start = Instant::now();
        let response = run_handler(Arc::clone(handler), &route, event, raw, context).await;
        let duration = start.elapsed();

        counter!(
            "route_dispatch_total",
            "route" => route.clone(),
            "status" => response.status_code.to_string()
        )
        .increment(1);
        histogram!("route_dispatch_duration_seconds", "route" => route).record(duration.as_secs_f64());
        response
    }
}

async fn run_handler(
    handler: Arc<dyn RouteHandler>,
    route: &str,
    event: NormalizedEvent,
    raw: Arc<TransportEvent>,
    context: Arc<dyn InvocationContext>,
) -> RouteResponse {
    let connection_id = event.connection_id.clone();
    let deadline = event.deadline;
    let args = RouteArgs {
        id: connection_id.clone(),
        event,
        raw,
        context,
    };

    let fut = AssertUnwindSafe(handler.handle(args)).catch_unwind();
    match tokio::time::timeout(deadline, fut).await {
        Ok(Ok(Ok(response))) => {
            debug!(connection_id = %connection_id, route, status = response.status_code, "route handled");
            response
        }
        Ok(Ok(Err(err))) => {
            warn!(connection_id = %connection_id, route, error = %err, "route handler failed");
            RouteResponse::status(err.status_code())
        }
        Ok(Err(_panic)) => {
            error!(connection_id = %connection_id, route, "route handler panicked");
            RouteResponse::status(500)
        }
        Err(_elapsed) => {
            error!(
                connection_id = %connection_id,
                route,
                deadline_ms = deadline.as_millis() as u64,
                "route handler exceeded deadline"
            );
            RouteResponse::status(TIMEOUT_STATUS)
        }
    }
}
