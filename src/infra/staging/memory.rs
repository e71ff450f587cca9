//! In-memory staging store backend.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{StagingStore, WorkerError};

#[derive(Default)]
struct Inner {
    values: HashMap<String, Vec<u8>>,
    sets: HashMap<String, BTreeSet<String>>,
    counters: HashMap<String, u64>,
}

/// Simple in-memory staging store for development/testing.
///
/// Every operation takes a single short lock, so counter increments are
/// atomic and reads observe all prior writes.
#[derive(Default)]
pub struct InMemoryStagingStore {
    inner: Mutex<Inner>,
}

impl InMemoryStagingStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of plain values held (sets and counters excluded).
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.inner.lock().values.len()
    }
}

#[async_trait]
impl StagingStore for InMemoryStagingStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WorkerError> {
        Ok(self.inner.lock().values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), WorkerError> {
        self.inner.lock().values.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), WorkerError> {
        let mut inner = self.inner.lock();
        inner.values.remove(key);
        inner.sets.remove(key);
        inner.counters.remove(key);
        Ok(())
    }

    async fn add_to_set(&self, set_key: &str, member: &str) -> Result<bool, WorkerError> {
        Ok(self
            .inner
            .lock()
            .sets
            .entry(set_key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn remove_from_set(&self, set_key: &str, member: &str) -> Result<bool, WorkerError> {
        let mut inner = self.inner.lock();
        let Some(set) = inner.sets.get_mut(set_key) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        if set.is_empty() {
            inner.sets.remove(set_key);
        }
        Ok(removed)
    }

    async fn members_of(&self, set_key: &str) -> Result<Vec<String>, WorkerError> {
        Ok(self
            .inner
            .lock()
            .sets
            .get(set_key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn increment_counter(&self, name: &str) -> Result<u64, WorkerError> {
        let mut inner = self.inner.lock();
        let counter = inner.counters.entry(name.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn get_counter(&self, name: &str) -> Result<u64, WorkerError> {
        Ok(self.inner.lock().counters.get(name).copied().unwrap_or(0))
    }

    async fn increment_once(&self, name: &str, marker: &str) -> Result<Option<u64>, WorkerError> {
        let mut inner = self.inner.lock();
        if inner.values.contains_key(marker) {
            return Ok(None);
        }
        inner.values.insert(marker.to_string(), b"1".to_vec());
        let counter = inner.counters.entry(name.to_string()).or_insert(0);
        *counter += 1;
        Ok(Some(*counter))
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool, WorkerError> {
        let mut inner = self.inner.lock();
        if inner.values.get(key).is_some_and(|v| v.as_slice() == expected) {
            inner.values.remove(key);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
