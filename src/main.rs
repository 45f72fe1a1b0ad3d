//! CLI for RecordCast
//!
//! Subcommands:
//! - `server`: run the WebSocket host
//! - `client`: a small smoke-test client (`watch`, `search`, `update`)

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tracing::{error, info};
use tungstenite::protocol::Message as WsMessage;

use recordcast::broker::EventBus;
use recordcast::config::load_config;
use recordcast::gateway::Gateway;
use recordcast::store::RecordStore;
use recordcast::transport::{ClientStream, connect, start_websocket_server};
use recordcast::utils::{Error, Result, logging};

#[derive(Parser)]
#[command(name = "recordcast")]
enum Command {
    /// Start the WebSocket server
    Server,
    /// Run the smoke-test client against a running server
    Client {
        /// WebSocket endpoint to connect to
        #[arg(long, default_value = "ws://127.0.0.1:3001/graphql")]
        url: String,
        #[command(subcommand)]
        action: ClientAction,
    },
}

#[derive(Subcommand)]
enum ClientAction {
    /// Subscribe to `textUpdated` and print every snapshot
    Watch,
    /// Run `searchResults` and print the matches
    Search {
        #[arg(default_value = "")]
        query: String,
    },
    /// Run `updateText` on one record
    Update { id: String, text: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cmd = Command::parse();

    let outcome = match cmd {
        Command::Server => run_server().await.map_err(|e| ("Server", e)),
        Command::Client { url, action } => {
            logging::init("info");
            run_client(&url, action).await.map_err(|e| ("Client", e))
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err((what, e)) => {
            // no-op when a level was already installed
            logging::init("info");
            error!("{what} failed: {} ({})", e, e.code());
            ExitCode::FAILURE
        }
    }
}

async fn run_server() -> Result<()> {
    let config = load_config()?;
    logging::init(&config.log.level);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let bus = EventBus::from_settings(&config.bus);
    info!(
        "Event bus: {} events buffered per subscriber, overflow policy {:?}",
        bus.buffer(),
        bus.overflow_policy()
    );
    let gateway = Arc::new(Gateway::new(
        RecordStore::seeded(),
        bus,
        config.bus.topic.clone(),
    ));
    info!(
        "Loaded {} records; publishing updates on {}",
        gateway.store().len(),
        gateway.topic()
    );

    tokio::select! {
        result = start_websocket_server(addr, gateway, config) => {
            result?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

async fn run_client(url: &str, action: ClientAction) -> Result<()> {
    let mut ws = connect(url).await?;

    send(&mut ws, json!({ "type": "connection_init" })).await?;
    let ack = recv(&mut ws).await?;
    if ack["type"] != "connection_ack" {
        return Err(Error::MalformedRequest(format!("expected connection_ack, got {ack}")));
    }

    let (query, variables) = match &action {
        ClientAction::Watch => ("subscription { textUpdated { id text } }", json!({})),
        ClientAction::Search { query } => (
            "query Search($query: String) { searchResults(query: $query) { id text } }",
            json!({ "query": query }),
        ),
        ClientAction::Update { id, text } => (
            "mutation Update($id: ID!, $text: String) { updateText(id: $id, text: $text) { status id } }",
            json!({ "id": id, "text": text }),
        ),
    };

    send(
        &mut ws,
        json!({
            "type": "subscribe",
            "id": "1",
            "payload": { "query": query, "variables": variables }
        }),
    )
    .await?;

    let outcome = loop {
        let frame = match recv(&mut ws).await {
            Ok(frame) => frame,
            Err(e) => break Err(e),
        };
        match frame["type"].as_str() {
            Some("next") => {
                println!("{}", serde_json::to_string_pretty(&frame["payload"])?);
                if let Some(errors) = operation_errors(&frame["payload"]) {
                    break Err(errors);
                }
            }
            Some("error") => break Err(Error::Operation(frame["payload"].to_string())),
            Some("complete") => break Ok(()),
            Some("ping") => send(&mut ws, json!({ "type": "pong" })).await?,
            _ => {}
        }
    };

    // the server may already have closed the socket
    let _ = ws.close(None).await;
    outcome
}

fn operation_errors(payload: &Value) -> Option<Error> {
    let errors = payload["errors"].as_array().filter(|errors| !errors.is_empty())?;
    let message = errors
        .iter()
        .map(|e| match e["extensions"]["code"].as_str() {
            Some(code) => format!("{} [{code}]", e["message"].as_str().unwrap_or_default()),
            None => e["message"].as_str().unwrap_or_default().to_string(),
        })
        .collect::<Vec<_>>()
        .join("; ");
    Some(Error::Operation(message))
}

async fn send(ws: &mut ClientStream, message: Value) -> Result<()> {
    ws.send(WsMessage::text(message.to_string())).await?;
    Ok(())
}

async fn recv(ws: &mut ClientStream) -> Result<Value> {
    while let Some(frame) = ws.next().await {
        match frame? {
            WsMessage::Text(text) => return Ok(serde_json::from_str(text.as_str())?),
            WsMessage::Close(frame) => {
                let reason = frame.map(|f| format!("{} {}", u16::from(f.code), f.reason));
                return Err(Error::SubscriptionChannel(format!(
                    "server closed the connection: {}",
                    reason.unwrap_or_default()
                )));
            }
            _ => {}
        }
    }
    Err(Error::SubscriptionChannel("connection ended".to_string()))
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use recordcast::config::Settings;
    use recordcast::transport::serve;
    use tokio::net::TcpListener;

    async fn start() -> (String, Arc<Gateway>) {
        let settings = Settings::default();
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

    #[test]
    fn test_operation_errors_reads_payload_errors() {
        let payload = json!({
            "data": { "updateText": null },
            "errors": [{
                "message": "record 1 not found",
                "path": ["updateText"],
                "extensions": { "code": "NOT_FOUND" }
            }]
        });
        match operation_errors(&payload) {
            Some(Error::Operation(message)) => assert_eq!(message, "record 1 not found [NOT_FOUND]"),
            other => panic!("Expected an operation error, got {other:?}"),
        }

        assert!(operation_errors(&json!({ "data": { "searchResults": [] } })).is_none());
        assert!(operation_errors(&json!({ "data": null, "errors": [] })).is_none());
    }

    #[tokio::test]
    async fn test_client_fails_when_server_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = run_client(&format!("ws://{addr}/graphql"), ClientAction::Watch).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_client_update_of_unknown_record_fails() {
        let (url, gateway) = start().await;

        let result = run_client(
            &url,
            ClientAction::Update { id: "1".to_string(), text: "nope".to_string() },
        )
        .await;
        assert!(matches!(result, Err(Error::Operation(ref m)) if m.contains("NOT_FOUND")));
        assert!(gateway.store().search("nope").is_empty());
    }

    #[tokio::test]
    async fn test_client_search_and_update_succeed() {
        let (url, gateway) = start().await;

        run_client(&url, ClientAction::Search { query: "uij".to_string() }).await.unwrap();
        run_client(
            &url,
            ClientAction::Update { id: "27937".to_string(), text: "hello".to_string() },
        )
        .await
        .unwrap();
        assert_eq!(gateway.store().search("hello").len(), 1);
    }

    #[tokio::test]
    async fn test_client_update_with_bad_id_fails() {
        let (url, _gateway) = start().await;

        let result = run_client(
            &url,
            ClientAction::Update { id: "not-a-number".to_string(), text: "x".to_string() },
        )
        .await;
        assert!(result.is_err());
    }
}
