//! The `transport` module is responsible for handling network communication
//! with clients over WebSockets.
//!
//! It defines the `graphql-transport-ws` frames exchanged with clients and
//! implements the WebSocket server itself: handshake checks, the connection
//! lifecycle, and dispatching operations to the gateway.

pub mod message;
pub mod websocket;

pub use websocket::{ClientStream, connect, serve, start_websocket_server};

#[cfg(test)]
mod tests;
