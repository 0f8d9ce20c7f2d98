//! Single-invocation entry point.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};
use wsgate_core::{GatewayError, InvocationContext, TransportEvent};
use wsgate_routes::{Dispatcher, RouteResponse};
use wsgate_settings::GatewaySettings;

use crate::context::ManagedContext;
use crate::transport::ManagedTransport;

/// Normalize and dispatch one invocation.
///
/// Only an unroutable event (unknown kind, missing connection id) is an
/// error; handler failures come back as a non-200 [`RouteResponse`].
pub async fn handle_invocation(
    dispatcher: &Dispatcher,
    event: TransportEvent,
    context: Arc<dyn InvocationContext>,
) -> Result<RouteResponse, GatewayError> {
    let response = dispatcher.dispatch_event(event, context).await?;
    Ok(response)
}

/// Handle one invocation given as raw event JSON.
///
/// Delivery goes unsigned to `settings.managed.endpoint` when one is
/// configured, otherwise signed to the endpoint named by the event itself.
/// `remaining` is the platform's remaining-time hint.
#[instrument(skip_all)]
pub async fn invoke_json(
    dispatcher: &Dispatcher,
    settings: &GatewaySettings,
    raw: &str,
    remaining: Option<Duration>,
) -> Result<RouteResponse, GatewayError> {
    let event: TransportEvent = serde_json::from_str(raw)?;
    let transport = match settings.managed.endpoint.as_deref() {
        Some(endpoint) => ManagedTransport::new(endpoint),
        None => ManagedTransport::for_request(&event.request_context),
    };
    let context: Arc<dyn InvocationContext> = Arc::new(ManagedContext::new(Arc::new(transport), remaining));
    let connection_id = event.request_context.connection_id.clone();
    let event_type = event.request_context.event_type.clone();

    let response = handle_invocation(dispatcher, event, context).await?;
    info!(
        connection_id = %connection_id,
        event_type = %event_type,
        status = response.status_code,
        "invocation complete"
    );
    Ok(response)
}
