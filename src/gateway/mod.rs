//! The `gateway` module is the schema/resolver layer.
//!
//! It turns `searchResults`, `updateText` and `textUpdated` requests into
//! record store and event bus operations:
//!
//! ```text
//! type Record        { text: String, id: ID! }
//! type UpdatedRecord { status: String, id: ID! }
//! Query.searchResults(query: String): [Record]
//! Mutation.updateText(text: String, id: ID!): UpdatedRecord
//! Subscription.textUpdated: [Record]
//! ```

pub mod document;
pub mod request;

pub use document::{ArgValue, OperationKind, RootField};
pub use request::{ExecutionResult, GraphQlError, GraphQlRequest};

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::broker::{Event, EventBus, Subscription};
use crate::store::{Record, RecordId, RecordStore, UpdatedRecord, record::parse_id};
use crate::utils::{Error, Result};

pub const SEARCH_RESULTS: &str = "searchResults";
pub const UPDATE_TEXT: &str = "updateText";
pub const TEXT_UPDATED: &str = "textUpdated";

/// Maps one bus event to the value sent to the subscriber.
pub type Resolver = Arc<dyn Fn(&Event) -> ExecutionResult + Send + Sync>;

/// What running one request produced.
pub enum Execution {
    /// Queries and mutations: exactly one result.
    Single(ExecutionResult),
    /// Subscriptions: a live stream plus the resolver applied to each event.
    Stream {
        subscription: Subscription,
        resolve: Resolver,
    },
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Execution::Single(result) => f.debug_tuple("Single").field(result).finish(),
            Execution::Stream { subscription, .. } => f
                .debug_struct("Stream")
                .field("subscription", subscription.handle())
                .finish(),
        }
    }
}

/// Resolver glue between the wire surface, the record store and the bus.
#[derive(Debug)]
pub struct Gateway {
    store: RecordStore,
    bus: EventBus,
    topic: String,
    mutations: Mutex<()>,
}

impl Gateway {
    pub fn new(store: RecordStore, bus: EventBus, topic: impl Into<String>) -> Self {
        Self {
            store,
            bus,
            topic: topic.into(),
            mutations: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// `Query.searchResults`: a missing query matches every record.
    pub fn search_results(&self, query: Option<&str>) -> Vec<Record> {
        self.store.search(query.unwrap_or_default())
    }

    /// `Mutation.updateText`: update, then publish the full collection.
    ///
    /// Update, snapshot and publish run under one lock, so publishes reach
    /// subscribers in the order the mutations were applied.
    pub fn update_text(&self, id: RecordId, text: &str) -> Result<UpdatedRecord> {
        let _flight = self
            .mutations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        self.store.update(id, text)?;
        let snapshot: Arc<[Record]> = self.store.snapshot().into();
        let report = self.bus.publish(&self.topic, snapshot);

        info!(
            "Record {id} updated; notified {} subscriber(s) on {}",
            report.delivered, self.topic
        );
        Ok(UpdatedRecord::updated(id))
    }

    /// `Subscription.textUpdated`: a stream of future snapshots.
    pub fn text_updated(&self) -> Subscription {
        info!("Subscribing to {}...", self.topic);
        self.bus.subscribe(&self.topic)
    }

    /// Dispatch one request over the schema.
    ///
    /// `Err` means the request never reached a resolver (`MalformedRequest`).
    /// Resolver failures come back inside the `ExecutionResult`.
    pub fn execute(&self, request: &GraphQlRequest) -> Result<Execution> {
        let field = document::parse(&request.query, request.operation_name.as_deref())?;
        let args = bind_arguments(&field, request.variables.as_ref())?;
        let key = field.response_key().to_string();

        match (field.kind, field.name.as_str()) {
            (OperationKind::Query, SEARCH_RESULTS) => {
                check_arguments(&field, &["query"])?;
                let query = optional_string(&args, "query")?;
                let records = self.search_results(query.as_deref());
                Ok(Execution::Single(ExecutionResult::data(
                    &key,
                    serde_json::to_value(records)?,
                )))
            }
            (OperationKind::Mutation, UPDATE_TEXT) => {
                check_arguments(&field, &["id", "text"])?;
                let id = required_id(&args, "id")?;
                let text = optional_string(&args, "text")?
                    .ok_or_else(|| Error::MalformedRequest("argument 'text' is required".into()))?;
                let result = match self.update_text(id, &text) {
                    Ok(updated) => ExecutionResult::data(&key, serde_json::to_value(updated)?),
                    Err(err @ Error::NotFound(_)) => ExecutionResult::field_error(&key, &err),
                    Err(err) => return Err(err),
                };
                Ok(Execution::Single(result))
            }
            (OperationKind::Subscription, TEXT_UPDATED) => {
                check_arguments(&field, &[])?;
                let subscription = self.text_updated();
                Ok(Execution::Stream {
                    subscription,
                    resolve: Arc::new(move |event: &Event| resolve_text_updated(&key, event)),
                })
            }
            (kind, name @ (SEARCH_RESULTS | UPDATE_TEXT | TEXT_UPDATED)) => Err(
                Error::MalformedRequest(format!("field '{name}' is not available on {kind}")),
            ),
            (kind, name) => Err(Error::MalformedRequest(format!(
                "cannot query field '{name}' on type {kind}"
            ))),
        }
    }
}

/// Resolved value of one `textUpdated` event: the full snapshot.
pub fn resolve_text_updated(key: &str, event: &Event) -> ExecutionResult {
    debug!(
        "Received {} event {} ({} records)",
        event.topic,
        event.sequence,
        event.records.len()
    );
    match serde_json::to_value(&*event.records) {
        Ok(records) => ExecutionResult::data(key, records),
        Err(err) => ExecutionResult::field_error(key, &Error::from(err)),
    }
}

fn bind_arguments(field: &RootField, variables: Option<&Map<String, Value>>) -> Result<Map<String, Value>> {
    let mut bound = Map::new();
    for (name, value) in &field.arguments {
        let value = match value {
            ArgValue::Literal(value) => value.clone(),
            ArgValue::Variable(var) => variables
                .and_then(|vars| vars.get(var))
                .or_else(|| field.variable_defaults.get(var))
                .cloned()
                .unwrap_or(Value::Null),
        };
        if bound.insert(name.clone(), value).is_some() {
            return Err(Error::MalformedRequest(format!(
                "argument '{name}' given more than once"
            )));
        }
    }
    Ok(bound)
}

fn check_arguments(field: &RootField, allowed: &[&str]) -> Result<()> {
    match field
        .arguments
        .iter()
        .find(|(name, _)| !allowed.contains(&name.as_str()))
    {
        Some((name, _)) => Err(Error::MalformedRequest(format!(
            "unknown argument '{name}' on field '{}'",
            field.name
        ))),
        None => Ok(()),
    }
}

fn optional_string(args: &Map<String, Value>, name: &str) -> Result<Option<String>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(Error::MalformedRequest(format!(
            "argument '{name}' must be a String, got {other}"
        ))),
    }
}

fn required_id(args: &Map<String, Value>, name: &str) -> Result<RecordId> {
    match args.get(name) {
        None | Some(Value::Null) => Err(Error::MalformedRequest(format!(
            "argument '{name}' of type ID! is required"
        ))),
        Some(value) => parse_id(value).ok_or_else(|| {
            Error::MalformedRequest(format!("argument '{name}' is not a valid ID: {value}"))
        }),
    }
}
