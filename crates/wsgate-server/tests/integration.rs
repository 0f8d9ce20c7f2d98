//! End-to-end tests against a live emulator on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use wsgate_core::{ConnectionId, DeliveryError, EventNormalizer, Transport};
use wsgate_platform::ManagedTransport;
use wsgate_routes::{Dispatcher, HandlerError, RouteArgs, RouteResponse, RouteTable};
use wsgate_server::{EmulatorServer, ServerConfig};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const SLOW_HANDLER: Duration = Duration::from_secs(3);

#[derive(Clone, Default)]
struct Calls {
    connects: Arc<Mutex<Vec<ConnectionId>>>,
    disconnects: Arc<Mutex<Vec<ConnectionId>>>,
    finds: Arc<Mutex<Vec<Value>>>,
    slow: Arc<Mutex<Vec<ConnectionId>>>,
}

fn table(calls: &Calls) -> RouteTable {
    let mut table = RouteTable::new();
    let connects = Arc::clone(&calls.connects);
    let _ = table.connect(move |args: RouteArgs| {
        let connects = Arc::clone(&connects);
        async move {
            let denied = args
                .event
                .query
                .as_ref()
                .and_then(|q| q.get("deny"))
                .is_some();
            if denied {
                return Err::<RouteResponse, _>(HandlerError::rejected(401, "denied"));
            }
            connects.lock().push(args.id.clone());
            Ok(RouteResponse::ok())
        }
    });
    let disconnects = Arc::clone(&calls.disconnects);
    let _ = table.disconnect(move |args: RouteArgs| {
        let disconnects = Arc::clone(&disconnects);
        async move {
            disconnects.lock().push(args.id.clone());
            Ok::<_, HandlerError>(RouteResponse::ok())
        }
    });
    let finds = Arc::clone(&calls.finds);
    let _ = table.route("find", move |args: RouteArgs| {
        let finds = Arc::clone(&finds);
        async move {
            finds.lock().push(args.message().clone());
            let _ = args.reply(&json!({"found": []})).await;
            Ok::<_, HandlerError>(RouteResponse::ok())
        }
    });
    let _ = table.route("fail", |_args: RouteArgs| async {
        Err::<RouteResponse, _>(HandlerError::Internal("boom".into()))
    });
    let slow = Arc::clone(&calls.slow);
    let _ = table.route("slow", move |args: RouteArgs| {
        let slow = Arc::clone(&slow);
        async move {
            slow.lock().push(args.id.clone());
            tokio::time::sleep(SLOW_HANDLER).await;
            let _ = args.reply(&json!({"done": true})).await;
            Ok::<_, HandlerError>(RouteResponse::ok())
        }
    });
    table
}

/// Table whose disconnect handler counts its runs and then fails, either
/// with an error or by panicking.
fn failing_disconnect(runs: &Arc<AtomicUsize>, panics: bool) -> RouteTable {
    let mut table = RouteTable::new();
    let runs = Arc::clone(runs);
    let _ = table.disconnect(move |_args: RouteArgs| {
        let runs = Arc::clone(&runs);
        async move {
            let _ = runs.fetch_add(1, Ordering::SeqCst);
            if panics {
                panic!("disconnect handler bug");
            }
            Err::<RouteResponse, _>(HandlerError::Internal("session store unavailable".into()))
        }
    });
    table
}

async fn start(calls: &Calls) -> (EmulatorServer, SocketAddr) {
    start_with(table(calls)).await
}

async fn start_with(table: RouteTable) -> (EmulatorServer, SocketAddr) {
    let dispatcher = Dispatcher::new(EventNormalizer::default(), table);
    let server = EmulatorServer::new(ServerConfig::default(), dispatcher);
    let (addr, _handle) = server.listen().await.unwrap();
    (server, addr)
}

async fn open(addr: SocketAddr) -> Client {
    let (client, _resp) = connect_async(format!("ws://{addr}/")).await.unwrap();
    client
}

async fn next_text(client: &mut Client) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for frame")
        .unwrap()
        .unwrap();
    serde_json::from_str(msg.to_text().unwrap()).unwrap()
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

fn only_id(server: &EmulatorServer) -> ConnectionId {
    let ids = server.registry().ids();
    assert_eq!(ids.len(), 1);
    ids[0].clone()
}

#[tokio::test]
async fn connect_registers_connection() {
    let calls = Calls::default();
    let (server, addr) = start(&calls).await;
    let _client = open(addr).await;

    let id = only_id(&server);
    assert_eq!(calls.connects.lock().as_slice(), &[id]);
    server.shutdown().shutdown();
}

#[tokio::test]
async fn message_routes_by_payload_field() {
    let calls = Calls::default();
    let (server, addr) = start(&calls).await;
    let mut client = open(addr).await;

    client
        .send(Message::text(r#"{"message":"find","data":{}}"#))
        .await
        .unwrap();
    assert_eq!(next_text(&mut client).await, json!({"found": []}));
    assert_eq!(calls.finds.lock().as_slice(), &[json!({"data": {}})]);
    server.shutdown().shutdown();
}

#[tokio::test]
async fn disconnect_evicts_and_notifies() {
    let calls = Calls::default();
    let (server, addr) = start(&calls).await;
    let mut client = open(addr).await;
    let id = only_id(&server);

    client.close(None).await.unwrap();
    eventually(|| calls.disconnects.lock().len() == 1).await;
    assert!(server.registry().is_empty());
    assert_eq!(calls.disconnects.lock().as_slice(), &[id]);
    server.shutdown().shutdown();
}

#[tokio::test]
async fn control_plane_round_trip() {
    let calls = Calls::default();
    let (server, addr) = start(&calls).await;
    let mut client = open(addr).await;
    let id = only_id(&server);
    let encoded = utf8_percent_encode(id.as_str(), NON_ALPHANUMERIC).to_string();
    let http = reqwest::Client::new();

    for prefix in ["@connections", "%40connections"] {
        let body = format!(r#"{{"via":"{prefix}"}}"#);
        let resp = http
            .post(format!("http://{addr}/{prefix}/{encoded}"))
            .body(body.clone())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(frame.to_text().unwrap(), body);
    }
    server.shutdown().shutdown();
}

#[tokio::test]
async fn control_plane_status_codes() {
    let calls = Calls::default();
    let (server, addr) = start(&calls).await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("http://{addr}/@connections/nobody"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 410);

    let resp = http
        .put(format!("http://{addr}/@connections/"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    server.shutdown().shutdown();
}

#[tokio::test]
async fn rejected_connect_refuses_handshake() {
    let calls = Calls::default();
    let (server, addr) = start(&calls).await;

    let err = connect_async(format!("ws://{addr}/?deny=1")).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(resp) => assert_eq!(resp.status(), 401),
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
    assert!(server.registry().is_empty());
    assert!(calls.connects.lock().is_empty());
    server.shutdown().shutdown();
}

#[tokio::test]
async fn binary_frame_gets_error_notice() {
    let calls = Calls::default();
    let (server, addr) = start(&calls).await;
    let mut client = open(addr).await;
    let id = only_id(&server);

    client.send(Message::binary(vec![1, 2, 3])).await.unwrap();
    assert_eq!(
        next_text(&mut client).await,
        json!({"message": "Internal server error", "connectionId": id.as_str()})
    );
    server.shutdown().shutdown();
}

#[tokio::test]
async fn failing_handler_gets_error_notice() {
    let calls = Calls::default();
    let (server, addr) = start(&calls).await;
    let mut client = open(addr).await;

    client.send(Message::text(r#"{"message":"fail"}"#)).await.unwrap();
    let notice = next_text(&mut client).await;
    assert_eq!(notice["message"], "Internal server error");
    server.shutdown().shutdown();
}

#[tokio::test]
async fn managed_transport_against_emulator() {
    let calls = Calls::default();
    let (server, addr) = start(&calls).await;
    let mut client = open(addr).await;
    let id = only_id(&server);
    let transport = ManagedTransport::new(format!("http://{addr}"));

    transport
        .send(&id, bytes::Bytes::from_static(b"{\"hello\":1}"))
        .await
        .unwrap();
    assert_eq!(next_text(&mut client).await, json!({"hello": 1}));

    client.close(None).await.unwrap();
    eventually(|| server.registry().is_empty()).await;
    let err = transport.send(&id, bytes::Bytes::new()).await.unwrap_err();
    assert_eq!(err, DeliveryError::ConnectionNotFound(id));
    server.shutdown().shutdown();
}

#[tokio::test]
async fn health_counts_connections() {
    let calls = Calls::default();
    let (server, addr) = start(&calls).await;
    let _a = open(addr).await;
    let _b = open(addr).await;

    let health: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["connections"], 2);
    server.shutdown().shutdown();
}

#[tokio::test]
async fn close_during_slow_handler_evicts_immediately() {
    let calls = Calls::default();
    let (server, addr) = start(&calls).await;
    let mut client = open(addr).await;
    let id = only_id(&server);
    let encoded = utf8_percent_encode(id.as_str(), NON_ALPHANUMERIC).to_string();

    client.send(Message::text(r#"{"message":"slow"}"#)).await.unwrap();
    eventually(|| calls.slow.lock().len() == 1).await;
    client.close(None).await.unwrap();

    tokio::time::timeout(SLOW_HANDLER / 2, eventually(|| server.registry().is_empty()))
        .await
        .expect("connection still registered while its handler runs");
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/@connections/{encoded}"))
        .body("late")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 410);

    eventually(|| calls.disconnects.lock().len() == 1).await;
    assert_eq!(calls.disconnects.lock().as_slice(), &[id]);
    server.shutdown().shutdown();
}

async fn disconnect_failure_still_evicts(panics: bool) {
    let runs = Arc::new(AtomicUsize::new(0));
    let (server, addr) = start_with(failing_disconnect(&runs, panics)).await;
    let mut client = open(addr).await;
    let _id = only_id(&server);

    client.close(None).await.unwrap();
    eventually(|| runs.load(Ordering::SeqCst) == 1).await;
    assert!(server.registry().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(server.registry().is_empty());

    let _next = open(addr).await;
    let _ = only_id(&server);
    server.shutdown().shutdown();
}

#[tokio::test]
async fn failing_disconnect_handler_still_evicts() {
    disconnect_failure_still_evicts(false).await;
}

#[tokio::test]
async fn panicking_disconnect_handler_still_evicts() {
    disconnect_failure_still_evicts(true).await;
}
