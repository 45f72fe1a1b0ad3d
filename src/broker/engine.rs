//! Event bus engine
//!
//! This module contains the in-memory bus responsible for:
//! - keeping the topic -> subscriber registry
//! - fanning one published event out to every live subscriber of a topic
//! - enforcing the bounded-buffer overflow policy for slow subscribers
//!
//! Concurrency and usage notes:
//! - `EventBus` is cheap to clone; clones share one registry. Inject it where
//!   it is needed rather than reaching for a global.
//! - `publish` never awaits. It holds the registry lock for the whole fan-out,
//!   so publishes to a topic reach every subscriber in the same order.
//! - A subscriber whose channel is closed is removed during the publish that
//!   notices it. Other subscribers are unaffected.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::message::Event;
use super::stream::Subscription;
use super::topic::{SubscriberHandle, Topic};
use crate::config::BusSettings;
use crate::store::Record;

pub(crate) type Registry = Mutex<HashMap<String, Topic>>;

/// What the bus does with a subscriber whose buffer is full at publish time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Remove the subscriber. Its stream ends after the buffered events.
    #[default]
    Disconnect,
    /// Skip this event for that subscriber only.
    DropNewest,
}

/// Outcome of one `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    pub(crate) registry: Arc<Registry>,
    buffer: usize,
    overflow: OverflowPolicy,
}

impl EventBus {
    /// Per-subscriber buffer used by `EventBus::new`.
    pub const DEFAULT_BUFFER: usize = 16;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_BUFFER, OverflowPolicy::default())
    }

    /// Create a bus whose subscribers each buffer up to `buffer` events.
    pub fn with_capacity(buffer: usize, overflow: OverflowPolicy) -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            buffer: buffer.max(1),
            overflow,
        }
    }

    pub fn from_settings(settings: &BusSettings) -> Self {
        Self::with_capacity(settings.subscriber_buffer, settings.overflow_policy)
    }

    pub fn buffer(&self) -> usize {
        self.buffer
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow
    }

    /// Register a new subscriber on `topic`, creating the topic if needed.
    ///
    /// The returned stream only yields events published after this call.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        let handle = SubscriberHandle::new(topic);
        let (tx, rx) = mpsc::channel(self.buffer);

        lock_registry(&self.registry)
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(handle.id().clone(), tx);

        debug!("Subscriber {} attached to {topic}", handle.id());
        Subscription::new(handle, rx, Arc::downgrade(&self.registry))
    }

    /// Remove the subscriber named by `handle`.
    ///
    /// Idempotent: returns `false` when the handle was already removed or was
    /// never registered.
    pub fn unsubscribe(&self, handle: &SubscriberHandle) -> bool {
        remove_subscriber(&self.registry, handle)
    }

    #[cfg(test)]
    pub(crate) fn is_subscribed(&self, handle: &SubscriberHandle) -> bool {
        lock_registry(&self.registry)
            .get(handle.topic())
            .is_some_and(|topic| topic.contains(handle.id()))
    }

    /// Deliver `records` to every subscriber currently registered on `topic`.
    pub fn publish(&self, topic: &str, records: Arc<[Record]>) -> PublishReport {
        let mut registry = lock_registry(&self.registry);
        let mut report = PublishReport::default();

        let Some(topic) = registry.get_mut(topic) else {
            debug!("Topic '{topic}' has no subscribers yet");
            return report;
        };

        let event = Event {
            topic: topic.name.clone(),
            sequence: topic.next_sequence(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            records,
        };

        let mut evicted = Vec::new();
        for (sub_id, sender) in &topic.subscribers {
            match sender.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => match self.overflow {
                    OverflowPolicy::DropNewest => {
                        warn!(
                            "Subscriber {sub_id} is full; dropped event {} on {}",
                            event.sequence, event.topic
                        );
                        report.dropped += 1;
                    }
                    OverflowPolicy::Disconnect => {
                        warn!("Subscriber {sub_id} fell behind on {}; disconnecting", event.topic);
                        evicted.push(sub_id.clone());
                    }
                },
                Err(TrySendError::Closed(_)) => {
                    warn!("Subscriber {sub_id} channel closed; removing");
                    evicted.push(sub_id.clone());
                }
            }
        }

        for sub_id in &evicted {
            topic.unsubscribe(sub_id);
        }
        report.evicted = evicted.len();

        debug!(
            "Published event {} on {}: delivered={} dropped={} evicted={}",
            event.sequence, event.topic, report.delivered, report.dropped, report.evicted
        );
        report
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        lock_registry(&self.registry)
            .get(topic)
            .map_or(0, Topic::len)
    }

    #[cfg(test)]
    pub(crate) fn topic_count(&self) -> usize {
        lock_registry(&self.registry).len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn lock_registry(registry: &Registry) -> MutexGuard<'_, HashMap<String, Topic>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn remove_subscriber(registry: &Registry, handle: &SubscriberHandle) -> bool {
    let removed = lock_registry(registry)
        .get_mut(handle.topic())
        .is_some_and(|topic| topic.unsubscribe(handle.id()));
    if removed {
        debug!("Subscriber {} detached from {}", handle.id(), handle.topic());
    }
    removed
}
