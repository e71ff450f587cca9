//! Periodic drain of staged outcomes into the durable ledger.
//!
//! Staged keys are cleared only after the ledger accepted the batch that
//! contains them, and only while they still hold the bytes that were read.
//! Records staged or overwritten during a flush wait for the next one.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::core::{LoanLedger, StagingStore, WorkerError, ACCEPTED_SET, FAILED_SET};

/// Rows moved by one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Accepted loans persisted and cleared.
    pub accepted: usize,
    /// Failed loans persisted and cleared.
    pub failed: usize,
}

struct Batch<T> {
    /// Key and the raw bytes read for it.
    staged: Vec<(String, Vec<u8>)>,
    records: Vec<T>,
}

/// Moves staged records into a [`LoanLedger`].
pub struct BatchFlusher {
    store: Arc<dyn StagingStore>,
    ledger: Arc<dyn LoanLedger>,
}

impl BatchFlusher {
    /// Create a flusher from `store` into `ledger`.
    pub fn new(store: Arc<dyn StagingStore>, ledger: Arc<dyn LoanLedger>) -> Self {
        Self { store, ledger }
    }

    /// Flush accepted, then failed, records once.
    ///
    /// # Errors
    ///
    /// Store or ledger errors. Whatever was not persisted stays staged.
    pub async fn flush_once(&self) -> Result<FlushReport, WorkerError> {
        let mut report = FlushReport::default();

        let accepted = self.collect(ACCEPTED_SET).await?;
        if !accepted.records.is_empty() {
            let written = self.ledger.persist_accepted(&accepted.records).await?;
            self.clear(ACCEPTED_SET, &accepted.staged).await?;
            report.accepted = accepted.records.len();
            tracing::info!(rows = written, "accepted loans flushed");
        }

        let failed = self.collect(FAILED_SET).await?;
        if !failed.records.is_empty() {
            let written = self.ledger.persist_failed(&failed.records).await?;
            self.clear(FAILED_SET, &failed.staged).await?;
            report.failed = failed.records.len();
            tracing::info!(rows = written, "failed loans flushed");
        }

        Ok(report)
    }

    /// Flush every `interval` until `cancel` fires.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of an interval completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.flush_once().await {
                tracing::error!(error = %e, "flush failed, records stay staged");
            }
        }
        tracing::debug!("flusher stopped");
    }

    async fn collect<T: DeserializeOwned>(&self, set: &str) -> Result<Batch<T>, WorkerError> {
        let mut batch = Batch {
            staged: Vec::new(),
            records: Vec::new(),
        };
        for key in self.store.members_of(set).await? {
            let Some(raw) = self.store.get(&key).await? else {
                tracing::debug!(set, key = %key, "dropping index member without a record");
                self.store.remove_from_set(set, &key).await?;
                continue;
            };
            match serde_json::from_slice::<T>(&raw) {
                Ok(record) => {
                    batch.staged.push((key, raw));
                    batch.records.push(record);
                }
                Err(e) => tracing::error!(set, key = %key, error = %e, "malformed staged record left in place"),
            }
        }
        Ok(batch)
    }

    async fn clear(&self, set: &str, staged: &[(String, Vec<u8>)]) -> Result<(), WorkerError> {
        for (key, raw) in staged {
            if self.store.delete_if_equals(key, raw).await? {
                self.store.remove_from_set(set, key).await?;
            } else {
                tracing::debug!(set, key = %key, "record replaced during flush, kept for next run");
            }
        }
        Ok(())
    }
}
