//! Job envelope, retry policy and the queue abstraction.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::WorkerError;

/// Opaque job identifier assigned by the queue.
pub type JobId = String;

/// Retry delay policy carried on the job envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    /// Wait the same delay before every retry.
    Fixed {
        /// Delay in milliseconds.
        delay_ms: u64,
    },
    /// Double the delay on every retry, starting at `delay_ms`.
    Exponential {
        /// Base delay in milliseconds.
        delay_ms: u64,
    },
}

impl Backoff {
    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Self::Exponential { delay_ms } => {
                let shift = attempt.saturating_sub(1).min(32);
                Duration::from_millis(delay_ms.saturating_mul(1u64 << shift))
            }
        }
    }
}

/// Options supplied at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Total attempts allowed, including the first.
    pub attempts: u32,
    /// Delay policy between attempts.
    pub backoff: Backoff,
    /// Drop the job once it completes instead of retaining it.
    pub remove_on_complete: bool,
    /// Drop the job once it is dead-lettered instead of retaining it.
    pub remove_on_fail: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Backoff::Exponential { delay_ms: 1000 },
            remove_on_complete: true,
            remove_on_fail: true,
        }
    }
}

/// A unit of work handed out by a [`JobQueue`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Queue-assigned identifier.
    pub id: JobId,
    /// Job name given at enqueue.
    pub name: String,
    /// Domain payload.
    pub data: Value,
    /// Attempts already failed (0 on first delivery).
    pub attempts_made: u32,
    /// Enqueue options, including the retry policy.
    pub options: JobOptions,
    /// Enqueue timestamp in milliseconds since epoch.
    pub created_at_ms: u64,
}

impl Job {
    /// Attempt ceiling for this job.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.options.attempts
    }
}

/// Snapshot of job counts by lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    /// Ready to be dequeued.
    pub waiting: u64,
    /// Currently held by a worker.
    pub active: u64,
    /// Waiting out a retry backoff.
    pub delayed: u64,
    /// Completed and retained.
    pub completed: u64,
    /// Dead-lettered and retained.
    pub failed: u64,
}

/// What the queue did with a job reported as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// The job will be redelivered after `delay`.
    Retrying {
        /// The attempt number the redelivery will be (1-based).
        attempt: u32,
        /// Backoff before the job becomes waiting again.
        delay: Duration,
    },
    /// Attempts exhausted; the job will not be redelivered.
    DeadLettered,
}

/// Abstraction for queue backends with at-least-once delivery.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Add a job and return its id.
    async fn enqueue(
        &self,
        name: &str,
        data: Value,
        options: JobOptions,
    ) -> Result<JobId, WorkerError>;

    /// Wait for the next waiting job and mark it active.
    ///
    /// Implementations must be cancel-safe: dropping the future before it
    /// resolves must not lose a job.
    async fn dequeue(&self) -> Result<Job, WorkerError>;

    /// Counts by lifecycle state.
    async fn job_counts(&self) -> Result<JobCounts, WorkerError>;

    /// Number of jobs ready to run, excluding active and delayed jobs.
    async fn waiting_count(&self) -> Result<u64, WorkerError> {
        Ok(self.job_counts().await?.waiting)
    }

    /// Acknowledge successful processing of an active job.
    async fn complete(&self, job: &Job) -> Result<(), WorkerError>;

    /// Report an infrastructure failure for an active job.
    async fn fail(&self, job: Job, reason: &str) -> Result<FailureDisposition, WorkerError>;
}
