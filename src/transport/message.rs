//! `graphql-transport-ws` protocol frames
//!
//! Every frame is a JSON text message tagged by `type`. Client frames:
//! `connection_init`, `ping`, `pong`, `subscribe`, `complete`. Server frames:
//! `connection_ack`, `ping`, `pong`, `next`, `error`, `complete`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gateway::{ExecutionResult, GraphQlError, GraphQlRequest};

/// Value of the `Sec-WebSocket-Protocol` header this server speaks.
pub const SUBPROTOCOL: &str = "graphql-transport-ws";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "connection_init")]
    ConnectionInit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    #[serde(rename = "ping")]
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    #[serde(rename = "pong")]
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    #[serde(rename = "subscribe")]
    Subscribe { id: String, payload: GraphQlRequest },
    #[serde(rename = "complete")]
    Complete { id: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "connection_ack")]
    ConnectionAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    #[serde(rename = "ping")]
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    #[serde(rename = "pong")]
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    #[serde(rename = "next")]
    Next { id: String, payload: ExecutionResult },
    #[serde(rename = "error")]
    Error {
        id: String,
        payload: Vec<GraphQlError>,
    },
    #[serde(rename = "complete")]
    Complete { id: String },
}

/// Close codes defined by the sub-protocol.
pub mod close_code {
    pub const INVALID_MESSAGE: u16 = 4400;
    pub const UNAUTHORIZED: u16 = 4401;
    pub const INIT_TIMEOUT: u16 = 4408;
    pub const SUBSCRIBER_EXISTS: u16 = 4409;
    pub const TOO_MANY_INIT: u16 = 4429;
}
