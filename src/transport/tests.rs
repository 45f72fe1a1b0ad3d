use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tungstenite::protocol::Message as WsMessage;

use super::message::{ClientMessage, ServerMessage, close_code};
use super::{ClientStream, connect, serve};
use crate::broker::EventBus;
use crate::config::Settings;
use crate::gateway::{Gateway, GraphQlRequest};
use crate::store::RecordStore;
use crate::utils::Error;

const SUBSCRIBE_TEXT_UPDATED: &str = "subscription { textUpdated { id text } }";
const UPDATE_TEXT: &str =
    "mutation Update($id: ID!, $text: String) { updateText(id: $id, text: $text) { status id } }";

async fn start(settings: Settings) -> (String, Arc<Gateway>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let gateway = Arc::new(Gateway::new(
        RecordStore::seeded(),
        EventBus::from_settings(&settings.bus),
        settings.bus.topic.clone(),
    ));

    let url = format!("ws://{addr}{}", settings.server.path);
    tokio::spawn(serve(listener, gateway.clone(), settings));
    (url, gateway)
}

async fn send(ws: &mut ClientStream, message: Value) {
    ws.send(WsMessage::text(message.to_string())).await.unwrap();
}

async fn recv(ws: &mut ClientStream) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection ended")
            .unwrap();
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn recv_close_code(ws: &mut ClientStream) -> u16 {
    loop {
        let frame = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for close")
            .expect("connection ended without a close frame")
            .unwrap();
        if let WsMessage::Close(Some(frame)) = frame {
            return u16::from(frame.code);
        }
    }
}

async fn connect_and_init(url: &str) -> ClientStream {
    let mut ws = connect(url).await.unwrap();
    send(&mut ws, json!({ "type": "connection_init" })).await;
    assert_eq!(recv(&mut ws).await, json!({ "type": "connection_ack" }));
    ws
}

async fn subscribe(ws: &mut ClientStream, id: &str, query: &str, variables: Value) {
    send(
        ws,
        json!({
            "type": "subscribe",
            "id": id,
            "payload": { "query": query, "variables": variables }
        }),
    )
    .await;
}

async fn wait_for_subscribers(gateway: &Gateway, expected: usize) {
    timeout(Duration::from_secs(2), async {
        while gateway.bus().subscriber_count(gateway.topic()) != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber count never reached the expected value");
}

#[test]
fn test_client_message_deserialization() {
    let message: ClientMessage = serde_json::from_value(json!({
        "type": "subscribe",
        "id": "1",
        "payload": { "query": "{ searchResults { id } }" }
    }))
    .unwrap();
    assert_eq!(
        message,
        ClientMessage::Subscribe {
            id: "1".to_string(),
            payload: GraphQlRequest::new("{ searchResults { id } }"),
        }
    );

    let init: ClientMessage = serde_json::from_str(r#"{"type":"connection_init"}"#).unwrap();
    assert_eq!(init, ClientMessage::ConnectionInit { payload: None });

    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"publish"}"#).is_err());
}

#[test]
fn test_server_message_serialization() {
    let ack = serde_json::to_value(ServerMessage::ConnectionAck { payload: None }).unwrap();
    assert_eq!(ack, json!({ "type": "connection_ack" }));

    let complete = serde_json::to_value(ServerMessage::Complete { id: "7".into() }).unwrap();
    assert_eq!(complete, json!({ "type": "complete", "id": "7" }));
}

#[tokio::test]
async fn test_connection_init_is_acknowledged() {
    let (url, _gateway) = start(Settings::default()).await;
    connect_and_init(&url).await;
}

#[tokio::test]
async fn test_ping_gets_pong() {
    let (url, _gateway) = start(Settings::default()).await;
    let mut ws = connect(&url).await.unwrap();

    send(&mut ws, json!({ "type": "ping" })).await;
    assert_eq!(recv(&mut ws).await, json!({ "type": "pong" }));
}

#[tokio::test]
async fn test_query_returns_single_result_then_complete() {
    let (url, _gateway) = start(Settings::default()).await;
    let mut ws = connect_and_init(&url).await;

    subscribe(
        &mut ws,
        "q1",
        "query Search($q: String) { searchResults(query: $q) { id text } }",
        json!({ "q": "6oNo" }),
    )
    .await;

    let next = recv(&mut ws).await;
    assert_eq!(next["type"], "next");
    assert_eq!(next["id"], "q1");
    assert_eq!(
        next["payload"]["data"]["searchResults"],
        json!([{ "id": "24186", "text": "6oNoTbgkYpvO1I1lYalx0flJ4mqmo4SlysC1r" }])
    );
    assert_eq!(recv(&mut ws).await, json!({ "type": "complete", "id": "q1" }));
}

#[tokio::test]
async fn test_subscribers_receive_identical_snapshot_after_mutation() {
    let (url, gateway) = start(Settings::default()).await;
    let mut ws_a = connect_and_init(&url).await;
    let mut ws_b = connect_and_init(&url).await;
    let mut ws_c = connect_and_init(&url).await;

    subscribe(&mut ws_a, "a", SUBSCRIBE_TEXT_UPDATED, json!({})).await;
    subscribe(&mut ws_b, "b", SUBSCRIBE_TEXT_UPDATED, json!({})).await;
    wait_for_subscribers(&gateway, 2).await;

    subscribe(&mut ws_c, "m", UPDATE_TEXT, json!({ "id": "24186", "text": "hello" })).await;
    let reply = recv(&mut ws_c).await;
    assert_eq!(
        reply["payload"]["data"]["updateText"],
        json!({ "status": "updated", "id": "24186" })
    );
    assert_eq!(recv(&mut ws_c).await, json!({ "type": "complete", "id": "m" }));

    let event_a = recv(&mut ws_a).await;
    let event_b = recv(&mut ws_b).await;
    assert_eq!(event_a["id"], "a");
    assert_eq!(event_b["id"], "b");

    let snapshot = &event_a["payload"]["data"]["textUpdated"];
    assert_eq!(snapshot, &event_b["payload"]["data"]["textUpdated"]);
    assert_eq!(snapshot.as_array().unwrap().len(), 8);
    assert_eq!(snapshot[0], json!({ "id": "24186", "text": "hello" }));
}

#[tokio::test]
async fn test_mutation_on_unknown_id_reports_not_found() {
    let (url, gateway) = start(Settings::default()).await;
    let mut ws = connect_and_init(&url).await;

    subscribe(&mut ws, "m", UPDATE_TEXT, json!({ "id": "1", "text": "x" })).await;
    let reply = recv(&mut ws).await;
    assert_eq!(reply["type"], "next");
    assert_eq!(reply["payload"]["data"]["updateText"], Value::Null);
    assert_eq!(reply["payload"]["errors"][0]["extensions"]["code"], "NOT_FOUND");
    assert_eq!(gateway.store().len(), 8);
}

#[tokio::test]
async fn test_malformed_operation_gets_error_frame() {
    let (url, _gateway) = start(Settings::default()).await;
    let mut ws = connect_and_init(&url).await;

    subscribe(&mut ws, "bad", "{ nope }", json!({})).await;
    let reply = recv(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["id"], "bad");
    assert_eq!(reply["payload"][0]["extensions"]["code"], "BAD_REQUEST");

    // the connection stays usable
    send(&mut ws, json!({ "type": "ping" })).await;
    assert_eq!(recv(&mut ws).await, json!({ "type": "pong" }));
}

#[tokio::test]
async fn test_complete_stops_delivery() {
    let (url, gateway) = start(Settings::default()).await;
    let mut ws = connect_and_init(&url).await;

    subscribe(&mut ws, "s", SUBSCRIBE_TEXT_UPDATED, json!({})).await;
    wait_for_subscribers(&gateway, 1).await;

    send(&mut ws, json!({ "type": "complete", "id": "s" })).await;
    wait_for_subscribers(&gateway, 0).await;

    subscribe(&mut ws, "m", UPDATE_TEXT, json!({ "id": "72818", "text": "quiet" })).await;
    let reply = recv(&mut ws).await;
    assert_eq!(reply["id"], "m");
    assert_eq!(recv(&mut ws).await, json!({ "type": "complete", "id": "m" }));
}

#[tokio::test]
async fn test_disconnect_removes_subscribers() {
    let (url, gateway) = start(Settings::default()).await;
    let mut ws = connect_and_init(&url).await;

    subscribe(&mut ws, "1", SUBSCRIBE_TEXT_UPDATED, json!({})).await;
    subscribe(&mut ws, "2", SUBSCRIBE_TEXT_UPDATED, json!({})).await;
    wait_for_subscribers(&gateway, 2).await;

    drop(ws);
    wait_for_subscribers(&gateway, 0).await;

    let report = gateway.bus().publish(gateway.topic(), gateway.store().snapshot().into());
    assert_eq!(report.delivered, 0);
}

#[tokio::test]
async fn test_subscribe_before_init_is_unauthorized() {
    let (url, _gateway) = start(Settings::default()).await;
    let mut ws = connect(&url).await.unwrap();

    subscribe(&mut ws, "1", SUBSCRIBE_TEXT_UPDATED, json!({})).await;
    assert_eq!(recv_close_code(&mut ws).await, close_code::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicate_operation_id_closes_connection() {
    let (url, gateway) = start(Settings::default()).await;
    let mut ws = connect_and_init(&url).await;

    subscribe(&mut ws, "1", SUBSCRIBE_TEXT_UPDATED, json!({})).await;
    subscribe(&mut ws, "1", SUBSCRIBE_TEXT_UPDATED, json!({})).await;
    assert_eq!(recv_close_code(&mut ws).await, close_code::SUBSCRIBER_EXISTS);
    wait_for_subscribers(&gateway, 0).await;
}

#[tokio::test]
async fn test_second_init_closes_connection() {
    let (url, _gateway) = start(Settings::default()).await;
    let mut ws = connect_and_init(&url).await;

    send(&mut ws, json!({ "type": "connection_init" })).await;
    assert_eq!(recv_close_code(&mut ws).await, close_code::TOO_MANY_INIT);
}

#[tokio::test]
async fn test_invalid_frame_closes_connection() {
    let (url, _gateway) = start(Settings::default()).await;
    let mut ws = connect_and_init(&url).await;

    ws.send(WsMessage::text("not json".to_string())).await.unwrap();
    assert_eq!(recv_close_code(&mut ws).await, close_code::INVALID_MESSAGE);
}

#[tokio::test]
async fn test_missing_init_times_out() {
    let mut settings = Settings::default();
    settings.transport.connection_init_timeout_ms = 100;
    let (url, _gateway) = start(settings).await;
    let mut ws = connect(&url).await.unwrap();

    assert_eq!(recv_close_code(&mut ws).await, close_code::INIT_TIMEOUT);
}

#[tokio::test]
async fn test_unknown_path_is_rejected() {
    let (url, _gateway) = start(Settings::default()).await;
    let url = url.replace("/graphql", "/elsewhere");

    match connect(&url).await {
        Err(Error::WebSocket(tungstenite::Error::Http(response))) => {
            assert_eq!(response.status(), 404);
        }
        Err(other) => panic!("expected a 404 handshake failure, got {other}"),
        Ok(_) => panic!("handshake on an unknown path succeeded"),
    }
}

#[tokio::test]
async fn test_connection_limit() {
    let mut settings = Settings::default();
    settings.transport.max_connections = 1;
    let (url, _gateway) = start(settings).await;

    let _first = connect_and_init(&url).await;
    match connect(&url).await {
        Err(Error::WebSocket(tungstenite::Error::Http(response))) => {
            assert_eq!(response.status(), 503);
        }
        Err(other) => panic!("expected a 503 handshake failure, got {other}"),
        Ok(_) => panic!("connection beyond the limit was accepted"),
    }
}
