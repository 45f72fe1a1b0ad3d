//! Per-connection subscription registry
//!
//! Usage notes:
//! - `attach` spawns one forwarding task per subscription, so it must run
//!   inside a tokio runtime.
//! - The manager is owned by the connection task and is not shared; it needs
//!   no lock of its own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::state::SubscriptionState;
use crate::broker::{EventBus, SubscriberHandle, Subscription};
use crate::client::Client;
use crate::gateway::{GraphQlError, Resolver};
use crate::transport::message::ServerMessage;
use crate::utils::{Error, Result};

/// State shared between an entry and its forwarding task.
type SharedState = Arc<Mutex<SubscriptionState>>;

fn lock_state(state: &Mutex<SubscriptionState>) -> MutexGuard<'_, SubscriptionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn transition(state: &Mutex<SubscriptionState>, next: SubscriptionState) {
    let mut current = lock_state(state);
    if current.can_transition_to(next) {
        *current = next;
    } else {
        warn!("Ignoring subscription transition {:?} -> {:?}", *current, next);
    }
}

fn current(state: &Mutex<SubscriptionState>) -> SubscriptionState {
    *lock_state(state)
}

#[derive(Debug)]
struct Entry {
    handle: SubscriberHandle,
    state: SharedState,
    task: JoinHandle<()>,
}

#[derive(Debug)]
pub struct SubscriptionManager {
    bus: EventBus,
    client: Client,
    entries: HashMap<String, Entry>,
}

impl SubscriptionManager {
    pub fn new(bus: EventBus, client: Client) -> Self {
        Self {
            bus,
            client,
            entries: HashMap::new(),
        }
    }

    /// Start forwarding `subscription` to the client under operation `id`.
    ///
    /// A second subscription with a live `id` is refused and dropped, which
    /// releases its bus handle.
    pub fn attach(&mut self, id: &str, subscription: Subscription, resolve: Resolver) -> Result<()> {
        self.reap_finished();
        if self.entries.contains_key(id) {
            return Err(Error::DuplicateSubscription(id.to_string()));
        }

        let handle = subscription.handle().clone();
        let state: SharedState = Arc::new(Mutex::new(SubscriptionState::Requested));
        transition(&state, SubscriptionState::Active);

        let task = tokio::spawn(forward(
            id.to_string(),
            subscription,
            resolve,
            self.client.clone(),
            state.clone(),
        ));

        info!("{} subscribed as operation {id}", self.client.id);
        self.entries.insert(id.to_string(), Entry { handle, state, task });
        Ok(())
    }

    /// Voluntary unsubscribe. Returns `false` for an unknown or finished id.
    pub fn detach(&mut self, id: &str) -> bool {
        self.reap_finished();
        match self.entries.remove(id) {
            Some(entry) => {
                self.terminate(id, entry, SubscriptionState::Unsubscribed);
                true
            }
            None => false,
        }
    }

    /// Transport teardown: terminate every subscription of this connection.
    pub fn disconnect_all(&mut self) -> usize {
        let entries: Vec<_> = self.entries.drain().collect();
        let count = entries.len();
        for (id, entry) in entries {
            self.terminate(&id, entry, SubscriptionState::Disconnected);
        }
        if count > 0 {
            info!("Cleaned up {count} subscription(s) for {}", self.client.id);
        }
        count
    }

    pub fn contains(&mut self, id: &str) -> bool {
        self.reap_finished();
        self.entries.contains_key(id)
    }

    pub fn active_count(&mut self) -> usize {
        self.reap_finished();
        self.entries.len()
    }

    /// Current state of a tracked operation.
    ///
    /// An operation the bus evicted reports `Disconnected` until the next
    /// registry access reaps it; after that it is no longer tracked.
    pub fn state_of(&self, id: &str) -> Option<SubscriptionState> {
        self.entries.get(id).map(|entry| current(&entry.state))
    }

    fn terminate(&self, id: &str, entry: Entry, via: SubscriptionState) {
        // the forwarding task may already have marked itself disconnected
        if current(&entry.state).is_delivering() {
            transition(&entry.state, via);
        }
        entry.task.abort();
        self.bus.unsubscribe(&entry.handle);
        transition(&entry.state, SubscriptionState::Terminated);
        debug!("Operation {id} of {} terminated ({via:?})", self.client.id);
    }

    /// Drop entries whose forwarding task ended on its own (eviction or a
    /// dead client channel).
    fn reap_finished(&mut self) {
        let finished: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.task.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        for id in finished {
            if let Some(entry) = self.entries.remove(&id) {
                self.terminate(&id, entry, SubscriptionState::Disconnected);
            }
        }
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

async fn forward(
    id: String,
    mut subscription: Subscription,
    resolve: Resolver,
    client: Client,
    state: SharedState,
) {
    while let Some(event) = subscription.next().await {
        if !current(&state).is_delivering() {
            return;
        }
        let payload = resolve(&event);
        if let Err(e) = client
            .send(&ServerMessage::Next {
                id: id.clone(),
                payload,
            })
            .await
        {
            warn!("Failed to deliver operation {id} to {}: {e}", client.id);
            transition(&state, SubscriptionState::Disconnected);
            return;
        }
    }

    // The bus removed this subscriber (overflow policy) and the buffer is drained.
    transition(&state, SubscriptionState::Disconnected);
    warn!("Operation {id} of {} was disconnected by the bus", client.id);
    let err = Error::SubscriptionChannel("subscriber could not keep up and was disconnected".into());
    let _ = client
        .send(&ServerMessage::Error {
            id,
            payload: vec![GraphQlError::from_error(&err)],
        })
        .await;
}
