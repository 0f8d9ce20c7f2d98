//! Built-in application served by the binary: echoes every message back
//! to its sender and logs connection lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};
use wsgate_routes::{Application, ConnectionParams, HandlerError, HandlerResult, RouteArgs, RouteResponse};

/// Echo application.
pub struct EchoApplication;

#[async_trait]
impl Application for EchoApplication {
    async fn on_connection(&self, params: Arc<ConnectionParams>) -> Result<(), HandlerError> {
        info!(connection_id = %params.connection_id, "echo: connection");
        Ok(())
    }

    async fn on_disconnect(&self, params: Arc<ConnectionParams>) {
        info!(connection_id = %params.connection_id, "echo: disconnect");
    }

    async fn on_message(&self, params: Option<Arc<ConnectionParams>>, args: RouteArgs) -> HandlerResult {
        let reply = json!({
            "route": args.route_key(),
            "data": args.message(),
            "known": params.is_some(),
        });
        if let Err(err) = args.reply(&reply).await {
            warn!(connection_id = %args.id, error = %err, "echo: reply failed");
            return Err(err.into());
        }
        Ok(RouteResponse::ok())
    }
}
