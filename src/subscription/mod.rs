//! The `subscription` module adapts bus subscriptions to a transport
//! connection's lifetime.
//!
//! Each connection owns one `SubscriptionManager`. It forwards events from
//! every active subscription to the connection's client and guarantees that
//! every subscriber handle is removed from the bus exactly once, whether the
//! client unsubscribes, the connection drops, or the bus evicts it.

pub mod manager;
pub mod state;

pub use manager::SubscriptionManager;
pub use state::SubscriptionState;
