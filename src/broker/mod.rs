//! The `broker` module is the in-process event bus.
//!
//! Public types:
//! - `EventBus`: named-topic registry; publishes one event to every live subscriber.
//! - `Subscription`: the receiving end of one subscriber, a cancellable stream of events.
//! - `SubscriberHandle`: opaque token naming one subscriber, used to remove it.
//! - `Event`: a published snapshot plus its topic, sequence and timestamp.

pub mod engine;
pub mod message;
pub mod stream;
pub mod topic;

pub use engine::{EventBus, OverflowPolicy, PublishReport};
pub use message::Event;
pub use stream::Subscription;
pub use topic::{SubscriberHandle, SubscriberId};
