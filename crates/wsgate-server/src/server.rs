//! `EmulatorServer`: axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use wsgate_core::InvocationContext;
use wsgate_routes::Dispatcher;

use crate::config::ServerConfig;
use crate::control;
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::transport::{LocalContext, LocalTransport, SocketRegistry};
use crate::websocket::handler::ws_handler;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Route dispatcher for every synthesized event.
    pub dispatcher: Arc<Dispatcher>,
    /// Open sockets.
    pub registry: Arc<SocketRegistry>,
    /// Delivery to open sockets.
    pub transport: Arc<LocalTransport>,
    /// Context handed to every dispatch.
    pub context: Arc<dyn InvocationContext>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: ShutdownCoordinator,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
}

/// The local transport emulator.
pub struct EmulatorServer {
    state: AppState,
}

impl EmulatorServer {
    /// Emulator dispatching through `dispatcher`.
    ///
    /// The registry is created here and lives as long as the server.
    pub fn new(config: ServerConfig, dispatcher: Dispatcher) -> Self {
        let registry = Arc::new(SocketRegistry::new());
        let transport = Arc::new(LocalTransport::new(Arc::clone(&registry)));
        let context = Arc::new(LocalContext::new(Arc::clone(&transport), config.default_deadline));
        Self {
            state: AppState {
                dispatcher: Arc::new(dispatcher),
                registry,
                transport,
                context,
                config: Arc::new(config),
                shutdown: ShutdownCoordinator::new(),
                start_time: Instant::now(),
                metrics: None,
            },
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the axum router.
    ///
    /// Control-plane, health and metrics routes are matched first; every
    /// other path accepts WebSocket upgrades.
    pub fn router(&self) -> Router {
        let deliver = post(control::post_to_connection).put(control::post_to_connection);
        let missing = post(control::missing_connection_id).put(control::missing_connection_id);

        let mut router = Router::new()
            .route("/@connections/{id}", deliver.clone())
            .route("/%40connections/{id}", deliver)
            .route("/@connections", missing.clone())
            .route("/@connections/", missing.clone())
            .route("/%40connections", missing.clone())
            .route("/%40connections/", missing)
            .route("/health", get(health_handler));
        if self.state.metrics.is_some() {
            router = router.route("/metrics", get(metrics_handler));
        }
        router
            .fallback(ws_handler)
            .layer(DefaultBodyLimit::max(self.state.config.max_message_size))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind and serve in the background.
    ///
    /// Returns the bound address and the server task. The task ends after
    /// [`ShutdownCoordinator::shutdown`], clearing the registry on the way out.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.state.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.state.shutdown.token();
        let registry = Arc::clone(&self.state.registry);
        info!(%local_addr, "emulator listening");

        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %err, "emulator server failed");
            }
            let dropped = registry.clear();
            info!(dropped, "emulator stopped");
        });
        Ok((local_addr, handle))
    }

    /// Open sockets.
    pub fn registry(&self) -> &Arc<SocketRegistry> {
        &self.state.registry
    }

    /// Local delivery.
    pub fn transport(&self) -> &Arc<LocalTransport> {
        &self.state.transport
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.state.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.registry.len()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use tokio::sync::mpsc;
    use tower::ServiceExt;
    use wsgate_core::{ConnectionId, EventNormalizer};
    use wsgate_routes::RouteTable;

    use crate::websocket::connection::{ClientConnection, Frame};

    fn make_server() -> EmulatorServer {
        EmulatorServer::new(
            ServerConfig::default(),
            Dispatcher::new(EventNormalizer::default(), RouteTable::new()),
        )
    }

    fn request(method: Method, uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_connections() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(request(Method::GET, "/health", ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 0);
    }

    #[tokio::test]
    async fn unknown_connection_is_gone() {
        let server = make_server();
        for uri in ["/@connections/nobody", "/%40connections/nobody"] {
            let resp = server
                .router()
                .oneshot(request(Method::POST, uri, "hi"))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::GONE, "{uri}");
        }
    }

    #[tokio::test]
    async fn missing_id_is_not_found() {
        let server = make_server();
        for uri in ["/@connections/", "/%40connections/", "/@connections"] {
            let resp = server
                .router()
                .oneshot(request(Method::PUT, uri, "hi"))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn plain_http_on_other_paths_is_not_found() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(request(Method::GET, "/anything", ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upgrades_refused_while_shutting_down() {
        let server = make_server();
        server.shutdown().shutdown();
        let req = Request::builder()
            .method(Method::GET)
            .uri("/chat")
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-version", "13")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn metrics_route_only_with_handle() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(request(Method::GET, "/metrics", ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();
        let server = make_server().with_metrics(handle);
        let resp = server
            .router()
            .oneshot(request(Method::GET, "/metrics", ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn control_plane_forwards_body_and_decodes_id() {
        let server = make_server();
        let id = ConnectionId::from("k+/=");
        let (tx, mut rx) = mpsc::channel(4);
        let conn = Arc::new(ClientConnection::new(id.clone(), tx, Duration::from_secs(1)));
        let _ = server.registry().register(id, conn);

        let writer = tokio::spawn(async move {
            let out = rx.recv().await.unwrap();
            let _ = out.ack.send(Ok(()));
            out.frame
        });
        let resp = server
            .router()
            .oneshot(request(Method::POST, "/@connections/k%2B%2F%3D", r#"{"a":1}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(writer.await.unwrap(), Frame::Text(r#"{"a":1}"#.into()));
    }

    #[tokio::test]
    async fn control_plane_write_failure_is_500() {
        let server = make_server();
        let id = ConnectionId::from("flaky");
        let (tx, mut rx) = mpsc::channel(4);
        let conn = Arc::new(ClientConnection::new(id.clone(), tx, Duration::from_secs(1)));
        let _ = server.registry().register(id, conn);
        let _writer = tokio::spawn(async move {
            let out = rx.recv().await.unwrap();
            let _ = out.ack.send(Err("reset".into()));
        });

        let resp = server
            .router()
            .oneshot(request(Method::PUT, "/@connections/flaky", "x"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn listen_and_shutdown_clears_registry() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        let (tx, _rx) = mpsc::channel(1);
        let id = ConnectionId::from("c");
        let _ = server
            .registry()
            .register(id.clone(), Arc::new(ClientConnection::new(id, tx, Duration::from_secs(1))));

        server.shutdown().shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let server = make_server();
        let (addr, _handle) = server.listen().await.unwrap();
        let config = ServerConfig {
            port: addr.port(),
            ..ServerConfig::default()
        };
        let second = EmulatorServer::new(config, Dispatcher::new(EventNormalizer::default(), RouteTable::new()));
        let err = second.listen().await.unwrap_err();
        assert_matches!(err, ServerError::Bind { .. });
        server.shutdown().shutdown();
    }
}
