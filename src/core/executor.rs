//! Job handler trait bound to every worker.

use async_trait::async_trait;

use crate::core::{Job, WorkerError};

/// Business logic run for each dequeued job.
///
/// `Ok(())` means the job is done from the queue's point of view, including
/// jobs whose payload was *rejected* by domain rules. Return `Err` only for
/// infrastructure faults; the worker then hands the job back to the queue's
/// retry policy.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use loanq::core::{Job, JobHandler, WorkerError};
///
/// struct Echo;
///
/// #[async_trait]
/// impl JobHandler for Echo {
///     async fn handle(&self, job: &Job) -> Result<(), WorkerError> {
///         tracing::info!(job_id = %job.id, "echo");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Process one job to completion.
    async fn handle(&self, job: &Job) -> Result<(), WorkerError>;
}
