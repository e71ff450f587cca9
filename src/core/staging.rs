//! Staging store abstraction and the shared counter service.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::WorkerError;

/// Index set holding keys of staged accepted loans.
pub const ACCEPTED_SET: &str = "accepted-loans";
/// Index set holding keys of staged failed loans.
pub const FAILED_SET: &str = "failed-loans";

/// Key/value store with set indexes and atomic counters.
///
/// Must provide read-after-write consistency for a single key.
#[async_trait]
pub trait StagingStore: Send + Sync + 'static {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WorkerError>;
    /// Write a value, overwriting any previous one.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), WorkerError>;
    /// Delete a key (value, set or counter). Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), WorkerError>;
    /// Add `member` to `set_key`; returns `true` if it was not already present.
    async fn add_to_set(&self, set_key: &str, member: &str) -> Result<bool, WorkerError>;
    /// Remove `member` from `set_key`; returns `true` if it was present.
    async fn remove_from_set(&self, set_key: &str, member: &str) -> Result<bool, WorkerError>;
    /// All members of a set, empty if the set does not exist.
    async fn members_of(&self, set_key: &str) -> Result<Vec<String>, WorkerError>;
    /// Atomically increment a counter and return the new value.
    async fn increment_counter(&self, name: &str) -> Result<u64, WorkerError>;
    /// Current counter value, 0 if never incremented.
    async fn get_counter(&self, name: &str) -> Result<u64, WorkerError>;

    /// Atomically create `marker` and increment `name`, unless `marker`
    /// already exists. Returns the new value, or `None` if nothing changed.
    async fn increment_once(&self, name: &str, marker: &str) -> Result<Option<u64>, WorkerError>;

    /// Delete `key` only while its value still equals `expected`; returns
    /// whether it was deleted.
    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool, WorkerError>;
}

/// Key of a staged accepted loan.
#[must_use]
pub fn accepted_key(loan_id: &str) -> String {
    format!("accepted-loan:{loan_id}")
}

/// Key of a staged failed loan.
#[must_use]
pub fn failed_key(code: &str, job_id: &str) -> String {
    format!("failed-loans:{code}:{job_id}")
}

/// Marker recording that a job's outcome was counted.
#[must_use]
pub fn counted_key(job_id: &str) -> String {
    format!("processed-jobs:{job_id}")
}

/// The three lifetime counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKind {
    /// Requests received by ingress.
    Incoming,
    /// Jobs accepted by the pipeline.
    Processed,
    /// Jobs rejected by the pipeline.
    Failed,
}

impl CounterKind {
    /// All counters, in snapshot order.
    pub const ALL: [Self; 3] = [Self::Incoming, Self::Processed, Self::Failed];

    /// Store key backing this counter.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Incoming => "loan:incoming_count",
            Self::Processed => "processed_count",
            Self::Failed => "failed_count",
        }
    }
}

/// Counter service over a staging store.
///
/// Counters only ever go up. Each component receives its own handle, so tests
/// get isolated counters by handing in a fresh store.
#[derive(Clone)]
pub struct Counters {
    store: Arc<dyn StagingStore>,
}

impl Counters {
    /// Create a counter service backed by `store`.
    pub fn new(store: Arc<dyn StagingStore>) -> Self {
        Self { store }
    }

    /// Increment and return the new value.
    pub async fn increment(&self, kind: CounterKind) -> Result<u64, WorkerError> {
        self.store.increment_counter(kind.key()).await
    }

    /// Increment on behalf of `job_id` unless that job was already counted.
    ///
    /// Returns the new value, or `None` for a job counted before.
    pub async fn increment_for_job(
        &self,
        kind: CounterKind,
        job_id: &str,
    ) -> Result<Option<u64>, WorkerError> {
        self.store
            .increment_once(kind.key(), &counted_key(job_id))
            .await
    }

    /// Read the current value.
    pub async fn read(&self, kind: CounterKind) -> Result<u64, WorkerError> {
        self.store.get_counter(kind.key()).await
    }
}

impl std::fmt::Debug for Counters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Counters").finish_non_exhaustive()
    }
}
