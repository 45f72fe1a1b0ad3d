//! WebSocket transport
//!
//! This file hosts the gateway over WebSockets. Responsibilities:
//! - Accept TCP/WebSocket connections on the configured path, up to
//!   `transport.max_connections` at a time
//! - Negotiate the `graphql-transport-ws` sub-protocol
//! - Enforce `connection_init` -> `connection_ack` before any operation
//! - Run queries and mutations as single-result operations and hand
//!   subscriptions to the connection's `SubscriptionManager`
//! - Tear every subscription down when the socket goes away

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, accept_hdr_async, connect_async};
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tungstenite::http::{HeaderValue, StatusCode};
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::{CloseFrame, Message as WsMessage};

use super::message::{ClientMessage, SUBPROTOCOL, ServerMessage, close_code};
use crate::client::Client;
use crate::config::Settings;
use crate::gateway::{Execution, Gateway, GraphQlError};
use crate::subscription::SubscriptionManager;
use crate::utils::{Error, Result};

/// Bind `addr` and serve until the task is dropped.
pub async fn start_websocket_server(addr: String, gateway: Arc<Gateway>, settings: Settings) -> Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    let path = &settings.server.path;

    info!("Queries and mutations ready at ws://{addr}{path}");
    info!("Subscriptions ready at ws://{addr}{path}");

    serve(listener, gateway, settings).await;
    Ok(())
}

/// Accept connections from an already-bound listener.
pub async fn serve(listener: TcpListener, gateway: Arc<Gateway>, settings: Settings) {
    let connections = Arc::new(AtomicUsize::new(0));

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {e}");
                continue;
            }
        };

        let gateway = gateway.clone();
        let settings = settings.clone();
        let connections = connections.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, gateway, settings, connections).await {
                warn!("Connection from {peer} ended with error: {e}");
            }
        });
    }
}

/// Counts one open connection until dropped.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(counter: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        if counter.fetch_add(1, Ordering::SeqCst) >= max {
            counter.fetch_sub(1, Ordering::SeqCst);
            None
        } else {
            Some(Self(counter.clone()))
        }
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

/// `None` when the client asked for no sub-protocol, otherwise whether it
/// offered ours.
fn offers_subprotocol(req: &Request) -> Option<bool> {
    let mut offered = req
        .headers()
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .peekable();

    offered.peek()?;
    Some(offered.any(|protocol| protocol == SUBPROTOCOL))
}

enum Flow {
    Continue,
    Close(u16, String),
}

#[derive(Debug, Default)]
struct Session {
    init_received: bool,
    acknowledged: bool,
}

async fn handle_connection(
    stream: TcpStream,
    gateway: Arc<Gateway>,
    settings: Settings,
    connections: Arc<AtomicUsize>,
) -> Result<()> {
    let slot = ConnectionSlot::acquire(&connections, settings.transport.max_connections);
    let has_slot = slot.is_some();
    let path = settings.server.path.clone();

    let callback = move |req: &Request, mut response: Response| -> std::result::Result<Response, ErrorResponse> {
        if req.uri().path() != path {
            return Err(reject(StatusCode::NOT_FOUND, "not found"));
        }
        if !has_slot {
            return Err(reject(StatusCode::SERVICE_UNAVAILABLE, "too many connections"));
        }
        match offers_subprotocol(req) {
            Some(true) => {
                response
                    .headers_mut()
                    .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
            }
            Some(false) => {
                return Err(reject(StatusCode::BAD_REQUEST, "unsupported sub-protocol"));
            }
            None => {}
        }
        Ok(response)
    };

    let ws_stream = accept_hdr_async(stream, callback).await?;
    let Some(_slot) = slot else {
        return Ok(());
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<WsMessage>(settings.transport.outbound_buffer.max(1));
    let client = Client::new(tx);
    let mut manager = SubscriptionManager::new(gateway.bus().clone(), client.clone());
    info!("{} connected", client.id);

    let send_task = {
        let client_id = client.id.clone();
        spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = msg.is_close();
                if let Err(e) = ws_sender.send(msg).await {
                    warn!("Failed to send message to {client_id}: {e}");
                    break;
                }
                if closing {
                    break;
                }
            }
            debug!("Send loop closed for {client_id}");
        })
    };

    let init_deadline =
        Instant::now() + Duration::from_millis(settings.transport.connection_init_timeout_ms);
    let mut session = Session::default();

    loop {
        let next = if session.init_received {
            ws_receiver.next().await
        } else {
            match timeout_at(init_deadline, ws_receiver.next()).await {
                Ok(next) => next,
                Err(_) => {
                    close(&client, close_code::INIT_TIMEOUT, "Connection initialisation timeout").await;
                    break;
                }
            }
        };

        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                warn!("WebSocket error from {}: {e}", client.id);
                break;
            }
            None => break,
        };

        let flow = match msg {
            WsMessage::Text(text) => {
                handle_text(text.as_str(), &mut session, &gateway, &mut manager, &client).await
            }
            WsMessage::Binary(_) => Ok(Flow::Close(
                close_code::INVALID_MESSAGE,
                "Binary frames are not supported".to_string(),
            )),
            WsMessage::Close(_) => break,
            _ => Ok(Flow::Continue),
        };

        match flow {
            Ok(Flow::Continue) => {}
            Ok(Flow::Close(code, reason)) => {
                close(&client, code, &reason).await;
                break;
            }
            Err(e) => {
                warn!("Dropping {}: {e}", client.id);
                break;
            }
        }
    }

    info!("{} disconnected", client.id);
    manager.disconnect_all();
    drop(manager);
    drop(client);

    // flush a pending close frame before the socket goes away
    let _ = timeout(Duration::from_secs(1), send_task).await;
    Ok(())
}

async fn handle_text(
    text: &str,
    session: &mut Session,
    gateway: &Gateway,
    manager: &mut SubscriptionManager,
    client: &Client,
) -> Result<Flow> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(
                "Invalid client message from {}: {err} | {}",
                client.id,
                text.chars().take(100).collect::<String>()
            );
            return Ok(Flow::Close(
                close_code::INVALID_MESSAGE,
                "Invalid message received".to_string(),
            ));
        }
    };

    match message {
        ClientMessage::ConnectionInit { .. } => {
            if session.init_received {
                return Ok(Flow::Close(
                    close_code::TOO_MANY_INIT,
                    "Too many initialisation requests".to_string(),
                ));
            }
            session.init_received = true;
            session.acknowledged = true;
            client.send(&ServerMessage::ConnectionAck { payload: None }).await?;
            debug!("{} acknowledged", client.id);
        }
        ClientMessage::Ping { payload } => {
            client.send(&ServerMessage::Pong { payload }).await?;
        }
        ClientMessage::Pong { .. } => {}
        ClientMessage::Subscribe { .. } if !session.acknowledged => {
            return Ok(Flow::Close(close_code::UNAUTHORIZED, "Unauthorized".to_string()));
        }
        ClientMessage::Subscribe { id, payload } => {
            if manager.contains(&id) {
                return Ok(Flow::Close(
                    close_code::SUBSCRIBER_EXISTS,
                    format!("Subscriber for {id} already exists"),
                ));
            }

            match gateway.execute(&payload) {
                Ok(Execution::Single(result)) => {
                    client
                        .send(&ServerMessage::Next {
                            id: id.clone(),
                            payload: result,
                        })
                        .await?;
                    client.send(&ServerMessage::Complete { id }).await?;
                }
                Ok(Execution::Stream {
                    subscription,
                    resolve,
                }) => {
                    manager.attach(&id, subscription, resolve)?;
                }
                Err(err @ Error::MalformedRequest(_)) => {
                    debug!("Rejected operation {id} from {}: {err}", client.id);
                    client
                        .send(&ServerMessage::Error {
                            id,
                            payload: vec![GraphQlError::from_error(&err)],
                        })
                        .await?;
                }
                Err(err) => return Err(err),
            }
        }
        ClientMessage::Complete { id } => {
            if manager.detach(&id) {
                info!("{} unsubscribed operation {id}", client.id);
            }
        }
    }

    Ok(Flow::Continue)
}

async fn close(client: &Client, code: u16, reason: &str) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_string().into(),
    };
    let _ = client.send_raw(WsMessage::Close(Some(frame))).await;
}

pub type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a client connection to `url`, offering the `graphql-transport-ws`
/// sub-protocol.
pub async fn connect(url: &str) -> Result<ClientStream> {
    let mut request = url.into_client_request()?;
    request
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
    let (stream, _response) = connect_async(request).await?;
    Ok(stream)
}
