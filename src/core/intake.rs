//! Ingress-side submission of loan requests.

use std::sync::Arc;

use serde_json::Value;

use crate::core::{CounterKind, Counters, JobId, JobOptions, JobQueue, WorkerError};

/// Job name used for loan applications.
pub const LOAN_REQUEST_JOB: &str = "loan_request";

/// Counts and enqueues incoming loan requests.
///
/// Validation is left to the workers: any non-empty payload is accepted here
/// and judged asynchronously.
pub struct Intake {
    queue: Arc<dyn JobQueue>,
    counters: Counters,
    options: JobOptions,
}

impl Intake {
    /// Create an intake using the default retry policy.
    pub fn new(queue: Arc<dyn JobQueue>, counters: Counters) -> Self {
        Self {
            queue,
            counters,
            options: JobOptions::default(),
        }
    }

    /// Override the options attached to every submitted job.
    #[must_use]
    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }

    /// Count the request and enqueue it; returns the job id.
    ///
    /// # Errors
    ///
    /// `WorkerError::EmptyPayload` for `null` or `{}`; store or queue errors
    /// otherwise.
    pub async fn submit(&self, payload: Value) -> Result<JobId, WorkerError> {
        let empty = match &payload {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if empty {
            tracing::debug!("rejected empty loan request");
            return Err(WorkerError::EmptyPayload);
        }

        let incoming = self.counters.increment(CounterKind::Incoming).await?;
        let job_id = self
            .queue
            .enqueue(LOAN_REQUEST_JOB, payload, self.options.clone())
            .await?;
        tracing::info!(job_id = %job_id, incoming, "loan request queued");
        Ok(job_id)
    }
}
