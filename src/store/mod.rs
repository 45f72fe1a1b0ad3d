//! The `store` module holds the record collection served by the gateway.
//!
//! The collection is volatile: it is seeded once at process start and only
//! ever mutated through [`RecordStore::update`].

pub mod record;
pub mod seed;

pub use record::{Record, RecordId, UpdatedRecord};

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::utils::{Error, Result};

/// Exclusive owner of the record collection.
///
/// Records keep insertion order. Ids are unique; `text` is the only field that
/// changes after creation.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Mutex<Vec<Record>>,
}

impl RecordStore {
    /// Create a store holding the fixed seed collection.
    pub fn seeded() -> Self {
        Self {
            records: Mutex::new(seed::records()),
        }
    }

    /// Create a store from an arbitrary collection, rejecting duplicate ids.
    pub fn from_records(records: Vec<Record>) -> Result<Self> {
        for (i, record) in records.iter().enumerate() {
            if records[..i].iter().any(|r| r.id == record.id) {
                return Err(Error::DuplicateRecord(record.id));
            }
        }
        Ok(Self {
            records: Mutex::new(records),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every record whose text contains `query`, case-sensitive, in insertion
    /// order. The empty query matches everything.
    pub fn search(&self, query: &str) -> Vec<Record> {
        self.lock()
            .iter()
            .filter(|record| record.text.contains(query))
            .cloned()
            .collect()
    }

    /// Replace the text of the record with `id` and return the updated record.
    pub fn update(&self, id: RecordId, text: &str) -> Result<Record> {
        let mut records = self.lock();
        let record = records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(Error::NotFound(id))?;
        record.text = text.to_string();
        debug!("Record {id} updated");
        Ok(record.clone())
    }

    /// The full collection as it is right now.
    pub fn snapshot(&self) -> Vec<Record> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests;
