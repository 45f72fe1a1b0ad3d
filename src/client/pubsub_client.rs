//! Client representation
//!
//! `Client` holds the sending side of a per-connection bounded channel. The
//! transport drains the other side into the socket; anything that wants to
//! talk to the peer (gateway replies, subscription forwarders) goes through
//! `send`, which waits while the queue is full.

use tokio::sync::mpsc::Sender;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::transport::message::ServerMessage;
use crate::utils::{Error, Result};

#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    pub sender: Sender<WsMessage>,
}

impl Client {
    /// Create a new client with a sender channel. The `id` is a UUID used
    /// to identify the connection in logs and subscriber bookkeeping.
    pub fn new(sender: Sender<WsMessage>) -> Self {
        Self {
            id: format!("client-{}", Uuid::new_v4()),
            sender,
        }
    }

    /// Queue a protocol message for the peer.
    pub async fn send(&self, message: &ServerMessage) -> Result<()> {
        let text = serde_json::to_string(message)?;
        self.send_raw(WsMessage::text(text)).await
    }

    /// Queue a raw frame (pong, close) for the peer.
    pub async fn send_raw(&self, frame: WsMessage) -> Result<()> {
        self.sender
            .send(frame)
            .await
            .map_err(|_| Error::SubscriptionChannel(format!("{} outbound queue closed", self.id)))
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
