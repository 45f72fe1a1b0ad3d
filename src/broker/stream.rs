//! Subscriber stream
//!
//! `Subscription` is the receiving half of one subscriber. It is a
//! `futures::Stream` that suspends between events and ends when the
//! subscriber is removed from the bus and its buffer is drained.
//!
//! Dropping a `Subscription` removes its handle from the bus, so a cancelled
//! task never leaks a subscriber slot.

use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc::Receiver;

use super::engine::{Registry, remove_subscriber};
use super::message::Event;
use super::topic::SubscriberHandle;

#[derive(Debug)]
pub struct Subscription {
    handle: SubscriberHandle,
    receiver: Receiver<Event>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub(crate) fn new(handle: SubscriberHandle, receiver: Receiver<Event>, registry: Weak<Registry>) -> Self {
        Self {
            handle,
            receiver,
            registry,
        }
    }

    pub fn handle(&self) -> &SubscriberHandle {
        &self.handle
    }

    /// Stop delivery to this subscriber now.
    ///
    /// Events already buffered stay readable; nothing new is accepted.
    /// Returns whether this call removed the handle from the bus.
    pub fn cancel(&mut self) -> bool {
        let removed = self
            .registry
            .upgrade()
            .is_some_and(|registry| remove_subscriber(&registry, &self.handle));
        self.receiver.close();
        removed
    }

    /// Wait for the next event. `None` once the subscriber is gone and drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Take a buffered event without waiting.
    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            remove_subscriber(&registry, &self.handle);
        }
    }
}
