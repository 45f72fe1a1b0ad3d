//! The `error` module defines the error type used across `recordcast`.
//!
//! Store, bus, gateway and transport failures all funnel into [`Error`] so
//! callers can propagate them with `?` and the transport can map each kind to
//! the matching protocol response.

use thiserror::Error;

use crate::store::RecordId;

#[derive(Debug, Error)]
pub enum Error {
    /// The mutation target id is absent from the store.
    #[error("record {0} not found")]
    NotFound(RecordId),

    /// The request failed validation before reaching the core.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Delivering to a subscriber's channel failed.
    #[error("subscription channel error: {0}")]
    SubscriptionChannel(String),

    #[error("subscriber for operation '{0}' already exists")]
    DuplicateSubscription(String),

    /// A remote operation answered with GraphQL errors.
    #[error("operation failed: {0}")]
    Operation(String),

    #[error("record {0} is already present")]
    DuplicateRecord(RecordId),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

impl Error {
    /// Machine-readable code placed in GraphQL error extensions.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::MalformedRequest(_) => "BAD_REQUEST",
            Error::SubscriptionChannel(_) => "SUBSCRIPTION_CHANNEL",
            Error::DuplicateSubscription(_) => "DUPLICATE_SUBSCRIPTION",
            _ => "INTERNAL_SERVER_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
