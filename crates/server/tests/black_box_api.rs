use std::sync::Arc;

use coordinator_config::CoordinatorConfig;
use coordinator_server::app;
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = Arc::new(CoordinatorConfig::default());
        let (state, _workers) = app::build_in_memory(config);
        let router = app::build_app(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn register_then_discover_finds_the_instance() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/registry/handlers", srv.base_url))
        .json(&json!({
            "instanceId": "inst-1",
            "serviceName": "orders",
            "host": "127.0.0.1",
            "port": 9000,
            "commandTypes": ["CreateOrder"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["commandsRegistered"], 1);

    let res = client
        .get(format!(
            "{}/registry/handlers/discover?kind=COMMAND&typeName=CreateOrder",
            srv.base_url
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["totalCount"], 1);
    assert_eq!(body["instances"][0]["instanceId"], "inst-1");
}

#[tokio::test]
async fn heartbeat_updates_instance_state() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/registry/handlers", srv.base_url))
        .json(&json!({
            "instanceId": "inst-2",
            "serviceName": "orders",
            "host": "127.0.0.1",
            "port": 9001,
            "queryTypes": ["GetOrder"],
        }))
        .send()
        .await
        .unwrap();

    let res = client
        .post(format!("{}/health/heartbeat", srv.base_url))
        .json(&json!({
            "instanceId": "inst-2",
            "serviceName": "orders",
            "state": "HEALTHY",
            "clientTimestamp": chrono::Utc::now().to_rfc3339(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn submit_event_then_read_events_returns_it() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/events", srv.base_url))
        .json(&json!({
            "eventType": "OrderCreated",
            "aggregateId": "order-1",
            "aggregateType": "Order",
            "expectedSequence": 1,
            "payload": {"total": 42},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["sequenceNumber"], 1);

    let res = client
        .get(format!("{}/events/order-1", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let text = res.text().await.unwrap();
    assert!(text.contains("OrderCreated"));
}

#[tokio::test]
async fn concurrency_conflict_on_wrong_expected_sequence() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/events", srv.base_url))
        .json(&json!({
            "eventType": "OrderCreated",
            "aggregateId": "order-2",
            "aggregateType": "Order",
            "expectedSequence": 1,
            "payload": {},
        }))
        .send()
        .await
        .unwrap();

    let res = client
        .post(format!("{}/events", srv.base_url))
        .json(&json!({
            "eventType": "OrderShipped",
            "aggregateId": "order-2",
            "aggregateType": "Order",
            "expectedSequence": 1,
            "payload": {},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn save_and_read_back_snapshot() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/events", srv.base_url))
        .json(&json!({
            "eventType": "OrderCreated",
            "aggregateId": "order-3",
            "aggregateType": "Order",
            "expectedSequence": 1,
            "payload": {},
        }))
        .send()
        .await
        .unwrap();

    let res = client
        .post(format!("{}/snapshots", srv.base_url))
        .json(&json!({
            "aggregateId": "order-3",
            "aggregateType": "Order",
            "sequenceNumber": 1,
            "payload": {"total": 42},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/snapshots/order-3", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["sequenceNumber"], 1);
    assert_eq!(body["payload"]["total"], 42);
}

#[tokio::test]
async fn submit_command_without_handler_returns_service_unavailable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/commands", srv.base_url))
        .json(&json!({
            "commandId": "cmd-1",
            "aggregateId": "order-4",
            "commandType": "CancelOrder",
            "payload": {},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}
