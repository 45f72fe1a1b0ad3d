//! Topic management
//!
//! A `Topic` maps subscriber ids to the sending half of each subscriber's
//! bounded channel. Callers must synchronize access (the bus keeps every topic
//! behind one lock).

use std::collections::HashMap;

use tokio::sync::mpsc::Sender;
use uuid::Uuid;

use super::message::Event;

pub type SubscriberId = String;

/// Names one subscriber on one topic.
///
/// A handle can only be used to remove the subscriber it names; it does not
/// keep the subscriber alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberHandle {
    id: SubscriberId,
    topic: String,
}

impl SubscriberHandle {
    pub(crate) fn new(topic: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.to_string(),
        }
    }

    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub(crate) subscribers: HashMap<SubscriberId, Sender<Event>>,
    pub(crate) sequence: u64,
}

impl Topic {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashMap::new(),
            sequence: 0,
        }
    }

    /// Add a subscriber to the topic.
    pub fn subscribe(&mut self, id: SubscriberId, sender: Sender<Event>) {
        self.subscribers.insert(id, sender);
    }

    /// Remove a subscriber from the topic. Returns whether it was present.
    pub fn unsubscribe(&mut self, id: &SubscriberId) -> bool {
        self.subscribers.remove(id).is_some()
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub(crate) fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }
}
