//! Integration tests for the bridge server.
//!
//! These tests drive the real route table through warp's WebSocket test
//! client with an in-process broker and verify end-to-end behaviour.

use std::sync::Arc;
use std::time::Duration;

use bridge_server::{routes, AppContext, BridgeServer, ServerConfig};
use broker_gateway::{BrokerGateway, GatewayConfig, MemoryBroker};
use bytes::Bytes;
use drone_stream::StreamConfig;
use serde_json::{json, Value};
use tokio::time::timeout;
use warp::test::WsClient;

const WAIT: Duration = Duration::from_secs(2);

struct Bridge {
    broker: MemoryBroker,
    gateway: Arc<BrokerGateway>,
}

impl Bridge {
    fn new() -> Self {
        let broker = MemoryBroker::new();
        let gateway = Arc::new(BrokerGateway::new(
            Arc::new(broker.clone()),
            GatewayConfig::default(),
        ));
        Self { broker, gateway }
    }

    fn context(&self) -> AppContext {
        AppContext::new(Arc::clone(&self.gateway), StreamConfig::default())
    }

    async fn connect(&self) -> WsClient {
        warp::test::ws()
            .path("/ws")
            .handshake(routes(self.context()))
            .await
            .expect("WebSocket handshake failed")
    }

    async fn publish(&self, routing_key: &str, body: Value) {
        let payload = Bytes::from(serde_json::to_vec(&body).unwrap());
        self.gateway.publish(routing_key, payload).await.unwrap();
    }

    /// Poll until the broker holds `expected` consumers.
    async fn wait_for_consumers(&self, expected: usize) {
        timeout(WAIT, async {
            while self.broker.total_consumers().await != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("broker never reached {expected} consumers"));
    }
}

async fn send(client: &mut WsClient, event: &str, data: Value) {
    let frame = json!({"event": event, "data": data});
    client.send_text(frame.to_string()).await;
}

async fn recv(client: &mut WsClient) -> Value {
    let message = timeout(WAIT, client.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("socket closed");
    serde_json::from_str(message.to_str().expect("expected a text frame")).unwrap()
}

async fn assert_no_frame(client: &mut WsClient) {
    let result = timeout(Duration::from_millis(150), client.recv()).await;
    assert!(result.is_err(), "unexpected frame: {result:?}");
}

/// Test that the health endpoint answers.
#[tokio::test]
async fn test_health_endpoint() {
    let bridge = Bridge::new();
    let response = warp::test::request()
        .path("/health")
        .reply(&routes(bridge.context()))
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.body(), "OK");
}

/// Subscribe, receive queue-created notices, then receive telemetry.
#[tokio::test]
async fn test_subscribe_and_receive_telemetry() {
    let bridge = Bridge::new();
    let mut client = bridge.connect().await;

    send(&mut client, "subscribe", json!({"a": "drone-1"})).await;

    let first = recv(&mut client).await;
    assert_eq!(first["event"], "queue-created");
    assert!(first["data"].as_str().unwrap().ends_with("-drone-1-drone"));
    let second = recv(&mut client).await;
    assert_eq!(second["event"], "queue-created");
    assert!(second["data"].as_str().unwrap().ends_with("-drone-1-webrtc"));
    bridge.wait_for_consumers(2).await;

    bridge.publish("drone-1.phone.drone", json!({"alt": 10})).await;
    assert_eq!(
        recv(&mut client).await,
        json!({"event": "drone-topic", "data": {"alt": 10}})
    );

    bridge.publish("drone-1.phone.webrtc", json!({"sdp": "offer"})).await;
    assert_eq!(
        recv(&mut client).await,
        json!({"event": "webrtc-topic", "data": {"sdp": "offer"}})
    );
}

/// Legacy event names are accepted and malformed frames do not close the socket.
#[tokio::test]
async fn test_legacy_names_and_malformed_frames() {
    let bridge = Bridge::new();
    let mut client = bridge.connect().await;

    client.send_text("this is not json").await;
    send(&mut client, "self-destruct", json!({})).await;
    send(&mut client, "subscribe", json!({"a": {"nested": true}})).await;

    send(&mut client, "establish-rabbitmq-connection", json!(["d1", "d2"])).await;
    let mut created = Vec::new();
    for _ in 0..4 {
        let frame = recv(&mut client).await;
        assert_eq!(frame["event"], "queue-created");
        created.push(frame["data"].as_str().unwrap().to_string());
    }
    assert!(created[0].ends_with("-d1-drone"));
    assert!(created[1].ends_with("-d1-webrtc"));
    assert!(created[2].ends_with("-d2-drone"));
    assert!(created[3].ends_with("-d2-webrtc"));
}

/// Commands and signaling are published on the web-origin routing keys.
#[tokio::test]
async fn test_command_and_signaling_publish() {
    let bridge = Bridge::new();
    bridge.gateway.ensure_exchange().await.unwrap();
    bridge.gateway.declare_queue("device-d1").await.unwrap();
    bridge.gateway.bind("device-d1", "d1.web.#").await.unwrap();
    let mut device = bridge.gateway.consume("device-d1").await.unwrap();

    let mut client = bridge.connect().await;
    send(&mut client, "send-drone", json!({"droneID": "d1", "cmd": "land"})).await;

    let delivery = timeout(WAIT, device.deliveries.recv()).await.unwrap().unwrap();
    assert_eq!(delivery.routing_key, "d1.web.drone");
    let body: Value = serde_json::from_slice(&delivery.payload).unwrap();
    assert_eq!(body, json!({"droneID": "d1", "cmd": "land"}));

    send(&mut client, "subscribe", json!({"a": "d1"})).await;
    recv(&mut client).await;
    recv(&mut client).await;

    send(&mut client, "send-webrtc", json!({"candidate": "c1"})).await;
    let delivery = timeout(WAIT, device.deliveries.recv()).await.unwrap().unwrap();
    assert_eq!(delivery.routing_key, "d1.web.webrtc");
}

/// Cancel releases every consumer and stops delivery; the socket stays usable.
#[tokio::test]
async fn test_cancel_then_resubscribe() {
    let bridge = Bridge::new();
    let mut client = bridge.connect().await;

    send(&mut client, "subscribe", json!({"a": "d1"})).await;
    recv(&mut client).await;
    recv(&mut client).await;
    bridge.wait_for_consumers(2).await;

    send(&mut client, "cancel-consume", Value::Null).await;
    bridge.wait_for_consumers(0).await;
    assert!(bridge.broker.queue_names().await.is_empty());

    bridge.publish("d1.phone.drone", json!({"alt": 1})).await;
    assert_no_frame(&mut client).await;

    send(&mut client, "subscribe", json!({"a": "d1"})).await;
    recv(&mut client).await;
    recv(&mut client).await;
    bridge.wait_for_consumers(2).await;

    bridge.publish("d1.phone.drone", json!({"alt": 2})).await;
    assert_eq!(
        recv(&mut client).await,
        json!({"event": "drone-topic", "data": {"alt": 2}})
    );
}

/// Closing the socket cancels every consumer the session held.
#[tokio::test]
async fn test_disconnect_releases_consumers() {
    let bridge = Bridge::new();
    let mut client = bridge.connect().await;

    send(&mut client, "subscribe", json!({"a": "d1", "b": "d2"})).await;
    for _ in 0..4 {
        recv(&mut client).await;
    }
    send(&mut client, "drone-admin", Value::Null).await;
    bridge.wait_for_consumers(5).await;

    drop(client);
    bridge.wait_for_consumers(0).await;
    assert!(bridge.broker.queue_names().await.is_empty());
}

/// Closing sessions from the server side runs the same cleanup as a disconnect.
#[tokio::test]
async fn test_close_sessions_releases_consumers() {
    let bridge = Bridge::new();
    let ctx = bridge.context();
    let mut client = warp::test::ws()
        .path("/ws")
        .handshake(routes(ctx.clone()))
        .await
        .expect("WebSocket handshake failed");

    send(&mut client, "subscribe", json!({"a": "d1"})).await;
    recv(&mut client).await;
    recv(&mut client).await;
    send(&mut client, "admin-subscribe", Value::Null).await;
    bridge.wait_for_consumers(3).await;
    assert_eq!(ctx.live_sessions(), 1);

    assert!(ctx.close_sessions(WAIT).await);
    assert_eq!(ctx.live_sessions(), 0);
    assert_eq!(bridge.broker.total_consumers().await, 0);
    assert!(bridge.broker.queue_names().await.is_empty());
}

/// Two admin sockets share the admin queue; each message reaches one of them.
#[tokio::test]
async fn test_admin_sessions_share_queue() {
    let bridge = Bridge::new();
    let mut first = bridge.connect().await;
    let mut second = bridge.connect().await;

    send(&mut first, "admin-subscribe", Value::Null).await;
    send(&mut second, "admin-subscribe", Value::Null).await;
    bridge.wait_for_consumers(2).await;
    assert_eq!(bridge.broker.consumer_count("admin-drone").await, 2);

    let total = 4;
    for seq in 0..total {
        bridge
            .publish(&format!("drone-{seq}.phone.drone"), json!({"seq": seq}))
            .await;
    }

    let mut seqs = Vec::new();
    while seqs.len() < total {
        let frame = tokio::select! {
            frame = recv(&mut first) => frame,
            frame = recv(&mut second) => frame,
        };
        assert_eq!(frame["event"], "admin-drone-topic");
        seqs.push(frame["data"]["seq"].as_u64().unwrap());
    }
    seqs.sort_unstable();
    assert_eq!(seqs, vec![0, 1, 2, 3]);

    assert_no_frame(&mut first).await;
    assert_no_frame(&mut second).await;
}

/// Test that the server binds, serves health checks over TCP and shuts down.
#[tokio::test]
async fn test_server_lifecycle() {
    let bridge = Bridge::new();
    let config = ServerConfig::new().with_listen_addr("127.0.0.1:0".parse().unwrap());

    let server = BridgeServer::start(&config, Arc::clone(&bridge.gateway))
        .await
        .expect("Failed to start server");
    let addr = server.local_addr();
    assert!(addr.ip().is_loopback());
    assert_ne!(addr.port(), 0);

    let second = BridgeServer::start(
        &ServerConfig::new().with_listen_addr(addr),
        Arc::clone(&bridge.gateway),
    )
    .await;
    assert!(second.is_err(), "binding the same address twice should fail");

    server.shutdown().await;
}
