//! Framework adapter.
//!
//! Wires an [`Application`] collaborator into a [`RouteTable`]: connect
//! builds and authenticates [`ConnectionParams`], disconnect evicts them and
//! notifies the application, and every unmatched message is forwarded.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use wsgate_core::constants::PROVIDER;
use wsgate_core::{ConnectionId, ConnectionRegistry, MultiValue};

use crate::errors::{HandlerError, HandlerResult};
use crate::table::{RouteHandler, RouteTable};
use crate::types::{RouteArgs, RouteResponse};

/// Read-only view of a connection handed to the application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionParams {
    /// Always [`PROVIDER`].
    pub provider: String,
    /// Transport-assigned id.
    pub connection_id: ConnectionId,
    /// Handshake headers.
    pub headers: Option<MultiValue>,
    /// Handshake query parameters.
    pub query: Option<MultiValue>,
    /// Authentication result attached at connect time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Value>,
}

impl ConnectionParams {
    fn from_args(args: &RouteArgs) -> Self {
        Self {
            provider: PROVIDER.to_owned(),
            connection_id: args.id.clone(),
            headers: args.event.headers.clone(),
            query: args.event.query.clone(),
            authentication: None,
        }
    }
}

/// Per-connection params, keyed by connection id.
pub type ParamsStore = ConnectionRegistry<ConnectionParams>;

/// The application framework collaborator.
#[async_trait]
pub trait Application: Send + Sync {
    /// Parse authentication from handshake headers.
    ///
    /// `Ok(None)` means anonymous; an error refuses the connection with 401.
    async fn authenticate(&self, _headers: Option<&MultiValue>) -> Result<Option<Value>, HandlerError> {
        Ok(None)
    }

    /// A connection was accepted.
    async fn on_connection(&self, params: Arc<ConnectionParams>) -> Result<(), HandlerError>;

    /// A connection closed.
    async fn on_disconnect(&self, params: Arc<ConnectionParams>);

    /// A message arrived. `params` is `None` when this process never saw the
    /// connect event (managed mode invocations are independent).
    async fn on_message(&self, params: Option<Arc<ConnectionParams>>, args: RouteArgs) -> HandlerResult {
        let _ = (params, args);
        Ok(RouteResponse::ok())
    }
}

struct ConnectRoute {
    app: Arc<dyn Application>,
    store: Arc<ParamsStore>,
}

#[async_trait]
impl RouteHandler for ConnectRoute {
    async fn handle(&self, args: RouteArgs) -> HandlerResult {
        let mut params = ConnectionParams::from_args(&args);
        params.authentication = self
            .app
            .authenticate(params.headers.as_ref())
            .await
            .map_err(|err| HandlerError::rejected(401, err.to_string()))?;
        if params.authentication.is_some() {
            debug!(connection_id = %args.id, "parsed authentication from headers");
        }

        let params = Arc::new(params);
        let _ = self.store.register(args.id.clone(), Arc::clone(&params));
        if let Err(err) = self.app.on_connection(params).await {
            let _ = self.store.remove(&args.id);
            return Err(err);
        }
        info!(connection_id = %args.id, "connection");
        Ok(RouteResponse::ok())
    }
}

struct DisconnectRoute {
    app: Arc<dyn Application>,
    store: Arc<ParamsStore>,
}

#[async_trait]
impl RouteHandler for DisconnectRoute {
    async fn handle(&self, args: RouteArgs) -> HandlerResult {
        let params = self
            .store
            .remove(&args.id)
            .unwrap_or_else(|| Arc::new(ConnectionParams::from_args(&args)));
        self.app.on_disconnect(params).await;
        info!(connection_id = %args.id, "disconnect");
        Ok(RouteResponse::ok())
    }
}

struct MessageRoute {
    app: Arc<dyn Application>,
    store: Arc<ParamsStore>,
}

#[async_trait]
impl RouteHandler for MessageRoute {
    async fn handle(&self, args: RouteArgs) -> HandlerResult {
        let params = self.store.lookup(&args.id);
        debug!(connection_id = %args.id, known = params.is_some(), "default message");
        self.app.on_message(params, args).await
    }
}

/// Register connect, disconnect and default routes backed by `app`.
///
/// Returns the params store shared by the three routes.
pub fn install_framework_routes(table: &mut RouteTable, app: Arc<dyn Application>) -> Arc<ParamsStore> {
    let store = Arc::new(ParamsStore::new());
    let _ = table
        .connect(ConnectRoute {
            app: Arc::clone(&app),
            store: Arc::clone(&store),
        })
        .disconnect(DisconnectRoute {
            app: Arc::clone(&app),
            store: Arc::clone(&store),
        })
        .default_route(MessageRoute {
            app,
            store: Arc::clone(&store),
        });
    store
}
