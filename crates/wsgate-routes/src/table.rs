//! Route table: exactly one handler per lifecycle kind or message route key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use wsgate_core::constants::DEFAULT_ROUTE;

use crate::errors::HandlerResult;
use crate::types::RouteArgs;

/// Trait implemented by every route handler.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    /// Handle one event.
    async fn handle(&self, args: RouteArgs) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> RouteHandler for F
where
    F: Fn(RouteArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, args: RouteArgs) -> HandlerResult {
        (self)(args).await
    }
}

/// Handlers keyed by event kind and message route key.
///
/// Registering the same slot twice replaces the earlier handler.
#[derive(Clone, Default)]
pub struct RouteTable {
    connect: Option<Arc<dyn RouteHandler>>,
    disconnect: Option<Arc<dyn RouteHandler>>,
    routes: HashMap<String, Arc<dyn RouteHandler>>,
}

impl RouteTable {
    /// An empty table. Every event is acknowledged with 200.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect handler.
    pub fn connect(&mut self, handler: impl RouteHandler + 'static) -> &mut Self {
        self.connect = Some(Arc::new(handler));
        self
    }

    /// Set the disconnect handler.
    pub fn disconnect(&mut self, handler: impl RouteHandler + 'static) -> &mut Self {
        self.disconnect = Some(Arc::new(handler));
        self
    }

    /// Set the fallback handler for unmatched message route keys.
    pub fn default_route(&mut self, handler: impl RouteHandler + 'static) -> &mut Self {
        self.route(DEFAULT_ROUTE, handler)
    }

    /// Set the handler for a message route key.
    pub fn route(&mut self, key: impl Into<String>, handler: impl RouteHandler + 'static) -> &mut Self {
        let _ = self.routes.insert(key.into(), Arc::new(handler));
        self
    }

    pub(crate) fn connect_handler(&self) -> Option<&Arc<dyn RouteHandler>> {
        self.connect.as_ref()
    }

    pub(crate) fn disconnect_handler(&self) -> Option<&Arc<dyn RouteHandler>> {
        self.disconnect.as_ref()
    }

    /// Resolve a message route key: exact match, then the default route.
    ///
    /// Returns the key that matched alongside its handler.
    pub(crate) fn message_handler(&self, route_key: &str) -> Option<(String, &Arc<dyn RouteHandler>)> {
        self.routes
            .get_key_value(route_key)
            .or_else(|| self.routes.get_key_value(DEFAULT_ROUTE))
            .map(|(key, handler)| (key.clone(), handler))
    }

    /// Whether a handler is registered under a message route key.
    pub fn has_route(&self, key: &str) -> bool {
        self.routes.contains_key(key)
    }

    /// Registered message route keys (sorted).
    pub fn route_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.routes.keys().cloned().collect();
        keys.sort();
        keys
    }
}
