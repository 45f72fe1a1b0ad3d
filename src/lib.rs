//! # RecordCast
//!
//! `recordcast` serves a small in-memory record collection through a
//! query/mutation/subscription API and pushes every change to live
//! subscribers over WebSockets.
//!
//! ## Core Modules
//!
//! - `store`: the record collection, with substring search and in-place updates.
//! - `broker`: the in-process event bus. Topics, subscriber handles and bounded fan-out.
//! - `subscription`: ties bus subscriptions to a connection and guarantees cleanup.
//! - `gateway`: resolvers for `searchResults`, `updateText` and `textUpdated`.
//! - `client`: one connected WebSocket client.
//! - `transport`: the `graphql-transport-ws` WebSocket host.
//! - `config`: loading and merging server configuration.
//! - `utils`: shared error type and logging bootstrap.

pub mod broker;
pub mod client;
pub mod config;
pub mod gateway;
pub mod store;
pub mod subscription;
pub mod transport;
pub mod utils;
