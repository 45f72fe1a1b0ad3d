//! Event definitions for the bus
//!
//! Notes on fields:
//! - `topic`: topic name the event was published on
//! - `sequence`: per-topic counter starting at 1, assigned by the bus on publish
//! - `timestamp`: milliseconds since UNIX epoch; set by the bus on publish
//! - `records`: the full record collection at publish time, shared by every
//!   subscriber that receives this event

use std::sync::Arc;

use serde::Serialize;

use crate::store::Record;

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub topic: String,
    pub sequence: u64,
    pub timestamp: i64,
    pub records: Arc<[Record]>,
}
