//! Loan job processor: decide, stage, count, broadcast.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{
    accepted_key, decide, failed_key, AcceptedLoan, Broadcast, CounterKind, Counters, Decision,
    ErrorCode, Event, FailedRecord, Job, JobHandler, StagingStore, WorkerError, ACCEPTED_SET,
    FAILED_SET,
};
use crate::util::clock::now_ms;

/// Durable result of processing one job attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Staged as an accepted loan.
    Accepted {
        /// Loan identifier.
        loan_id: String,
        /// Staging key written.
        key: String,
        /// `false` when this job id was already counted (redelivery).
        first_delivery: bool,
    },
    /// Staged as a failed loan.
    Rejected {
        /// Rejection code.
        code: ErrorCode,
        /// Staging key written.
        key: String,
        /// `false` when this job id was already counted (redelivery).
        first_delivery: bool,
    },
}

/// Runs the validation pipeline and records its outcome.
///
/// Writes happen in a fixed order per job: record, index membership, counter,
/// then events. The counter moves at most once per job id, together with the
/// marker that records it, so a retry after a failed increment still counts.
/// A crash part way leaves the staged record as the source of truth.
pub struct LoanProcessor {
    store: Arc<dyn StagingStore>,
    counters: Counters,
    events: Arc<dyn Broadcast>,
}

impl LoanProcessor {
    /// Create a processor writing to `store` and announcing on `events`.
    pub fn new(store: Arc<dyn StagingStore>, counters: Counters, events: Arc<dyn Broadcast>) -> Self {
        Self {
            store,
            counters,
            events,
        }
    }

    /// Process one job and return what was staged.
    ///
    /// # Errors
    ///
    /// Any staging store failure. Domain rejections are `Ok(Outcome::Rejected)`.
    pub async fn process(&self, job: &Job) -> Result<Outcome, WorkerError> {
        match decide(&job.data) {
            Decision::Accepted(application) => {
                let record = AcceptedLoan::from_application(&application, now_ms());
                let key = accepted_key(&record.loan_id);
                self.stage(&key, ACCEPTED_SET, serde_json::to_vec(&record)?)
                    .await?;
                let count = self.counters.increment_for_job(CounterKind::Processed, &job.id).await?;
                let first_delivery = count.is_some();
                tracing::info!(
                    job_id = %job.id,
                    loan_id = %record.loan_id,
                    first_delivery,
                    "loan accepted"
                );

                self.events
                    .broadcast(&Event::success(job.id.clone(), record.loan_id.clone()));
                if let Some(count) = count {
                    self.events.broadcast(&Event::count(
                        CounterKind::Processed,
                        count,
                        Some(job.id.clone()),
                    ));
                }
                Ok(Outcome::Accepted {
                    loan_id: record.loan_id,
                    key,
                    first_delivery,
                })
            }
            Decision::Rejected { code, details } => {
                let key = failed_key(code.as_str(), &job.id);
                let record = FailedRecord {
                    job_id: job.id.clone(),
                    error_code: code,
                    details,
                    payload: job.data.clone(),
                    captured_at: now_ms(),
                };
                self.stage(&key, FAILED_SET, serde_json::to_vec(&record)?)
                    .await?;
                let count = self.counters.increment_for_job(CounterKind::Failed, &job.id).await?;
                let first_delivery = count.is_some();
                tracing::info!(
                    job_id = %job.id,
                    loan_id = record.loan_id().unwrap_or_default(),
                    code = %code,
                    details = %record.details,
                    first_delivery,
                    "loan rejected"
                );

                self.events.broadcast(&Event::rejected(job.id.clone(), code));
                if let Some(count) = count {
                    self.events.broadcast(&Event::count(
                        CounterKind::Failed,
                        count,
                        Some(job.id.clone()),
                    ));
                }
                Ok(Outcome::Rejected {
                    code,
                    key,
                    first_delivery,
                })
            }
        }
    }

    async fn stage(&self, key: &str, set: &str, value: Vec<u8>) -> Result<(), WorkerError> {
        self.store.set(key, value).await?;
        self.store.add_to_set(set, key).await?;
        Ok(())
    }
}

#[async_trait]
impl JobHandler for LoanProcessor {
    async fn handle(&self, job: &Job) -> Result<(), WorkerError> {
        self.process(job).await.map(|_| ())
    }
}
