//! Queue consumers with bounded in-flight concurrency and graceful close.
//!
//! A worker repeatedly takes a concurrency permit, dequeues a job and runs it
//! on its own task. Closing a worker stops dequeuing immediately but lets
//! every job already taken finish and be acknowledged.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::core::{FailureDisposition, Job, JobHandler, JobQueue, WorkerError};

/// Identifier of a worker within the pool, increasing with spawn order.
pub type WorkerId = u64;

/// Pause after a failed dequeue before asking the queue again.
const DEQUEUE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// What a worker did during its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// The worker.
    pub worker_id: WorkerId,
    /// Jobs handled and acknowledged.
    pub completed: u64,
    /// Jobs handed back to the queue's retry policy.
    pub failed: u64,
}

impl WorkerReport {
    fn record(&mut self, done: Result<bool, tokio::task::JoinError>) {
        match done {
            Ok(true) => self.completed += 1,
            Ok(false) => self.failed += 1,
            Err(e) => {
                self.failed += 1;
                tracing::error!(worker_id = self.worker_id, error = %e, "job task aborted");
            }
        }
    }
}

/// A running consumer bound to one queue and one handler.
///
/// Owned by the pool scaler's registry. Dropping the handle requests a close
/// but does not wait for it; use [`close`](Self::close) to drain.
pub struct WorkerHandle {
    id: WorkerId,
    concurrency: usize,
    cancel: CancellationToken,
    task: Option<JoinHandle<WorkerReport>>,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerHandle {
    /// Start a worker that runs up to `concurrency` jobs at once.
    ///
    /// The worker stops taking jobs when `cancel` fires.
    pub fn spawn(
        id: WorkerId,
        concurrency: usize,
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        cancel: CancellationToken,
    ) -> Self {
        let concurrency = concurrency.max(1);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let task = tokio::spawn(run(
            id,
            concurrency,
            queue,
            handler,
            cancel.clone(),
            Arc::clone(&in_flight),
        ));
        tracing::debug!(worker_id = id, concurrency, "worker started");
        Self {
            id,
            concurrency,
            cancel,
            task: Some(task),
            in_flight,
        }
    }

    /// Worker id.
    #[must_use]
    pub const fn id(&self) -> WorkerId {
        self.id
    }

    /// Maximum jobs in flight.
    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Jobs currently being handled.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Whether the worker task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop dequeuing, wait for in-flight jobs to finish, and release.
    ///
    /// # Errors
    ///
    /// `WorkerError::Shutdown` if already closed, `WorkerError::Worker` if the
    /// worker task panicked.
    pub async fn close(&mut self) -> Result<WorkerReport, WorkerError> {
        self.cancel.cancel();
        let task = self.task.take().ok_or(WorkerError::Shutdown)?;
        let report = task
            .await
            .map_err(|e| WorkerError::Worker(format!("worker {} failed: {e}", self.id)))?;
        tracing::debug!(
            worker_id = self.id,
            completed = report.completed,
            failed = report.failed,
            "worker closed"
        );
        Ok(report)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("concurrency", &self.concurrency)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

async fn run(
    id: WorkerId,
    concurrency: usize,
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    cancel: CancellationToken,
    in_flight: Arc<AtomicUsize>,
) -> WorkerReport {
    let permits = Arc::new(Semaphore::new(concurrency));
    let mut jobs: JoinSet<bool> = JoinSet::new();
    let mut report = WorkerReport {
        worker_id: id,
        ..WorkerReport::default()
    };

    loop {
        while let Some(done) = jobs.try_join_next() {
            report.record(done);
        }

        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        let dequeued = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            job = queue.dequeue() => job,
        };
        let job = match dequeued {
            Ok(job) => job,
            Err(e) => {
                drop(permit);
                tracing::warn!(worker_id = id, error = %e, "dequeue failed");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(DEQUEUE_RETRY_DELAY) => continue,
                }
            }
        };

        in_flight.fetch_add(1, Ordering::AcqRel);
        let queue = Arc::clone(&queue);
        let handler = Arc::clone(&handler);
        let in_flight = Arc::clone(&in_flight);
        jobs.spawn(async move {
            let _permit = permit;
            let ok = run_job(id, queue.as_ref(), handler.as_ref(), job).await;
            in_flight.fetch_sub(1, Ordering::AcqRel);
            ok
        });
    }

    while let Some(done) = jobs.join_next().await {
        report.record(done);
    }
    report
}

/// Handle one job and acknowledge it to the queue. Returns `true` on success.
async fn run_job(id: WorkerId, queue: &dyn JobQueue, handler: &dyn JobHandler, job: Job) -> bool {
    tracing::debug!(worker_id = id, job_id = %job.id, attempt = job.attempts_made + 1, "job started");
    match handler.handle(&job).await {
        Ok(()) => match queue.complete(&job).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(worker_id = id, job_id = %job.id, error = %e, "completion ack failed");
                false
            }
        },
        Err(e) => {
            let job_id = job.id.clone();
            tracing::warn!(worker_id = id, job_id = %job_id, error = %e, "job failed");
            match queue.fail(job, &e.to_string()).await {
                Ok(FailureDisposition::Retrying { attempt, delay }) => tracing::debug!(
                    worker_id = id,
                    job_id = %job_id,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "job scheduled for retry"
                ),
                Ok(FailureDisposition::DeadLettered) => {}
                Err(e) => {
                    tracing::error!(worker_id = id, job_id = %job_id, error = %e, "failure report rejected");
                }
            }
            false
        }
    }
}
