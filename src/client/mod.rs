//! The `client` module defines the representation of one connected transport
//! client: a unique identifier and the bounded channel that feeds its socket.

pub mod pubsub_client;
pub use pubsub_client::Client;
