//! In-memory job queue with retry backoff and dead-lettering.
//!
//! Jobs move `waiting -> active -> (completed | delayed -> waiting | failed)`.
//! Delivery is FIFO among waiting jobs. A failed job is parked in the delayed
//! set until its backoff elapses and then rejoins the back of the waiting line.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::core::{
    FailureDisposition, Job, JobCounts, JobId, JobOptions, JobQueue, WorkerError,
};
use crate::util::clock::now_ms;

/// A job that exhausted its attempts.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// The job as of its final attempt.
    pub job: Job,
    /// Reason reported with the final failure.
    pub reason: String,
    /// When the job was dead-lettered, ms since epoch.
    pub failed_at_ms: u64,
}

enum Take {
    Job(Job),
    /// Nothing waiting; carries the instant the next delayed job becomes due.
    Idle(Option<Instant>),
}

#[derive(Default)]
struct QueueState {
    waiting: VecDeque<Job>,
    delayed: Vec<(Instant, Job)>,
    active: HashMap<JobId, Job>,
    completed: Vec<Job>,
    failed: Vec<DeadLetter>,
}

impl QueueState {
    /// Move delayed jobs whose backoff has elapsed to the waiting line.
    fn promote_due(&mut self, now: Instant) {
        if self.delayed.is_empty() {
            return;
        }
        let mut due: Vec<(Instant, Job)> = Vec::new();
        let mut i = 0;
        while i < self.delayed.len() {
            if self.delayed[i].0 <= now {
                due.push(self.delayed.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|(at, _)| *at);
        self.waiting.extend(due.into_iter().map(|(_, job)| job));
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.iter().map(|(at, _)| *at).min()
    }

    fn pending(&self) -> usize {
        self.waiting.len() + self.delayed.len()
    }
}

/// In-memory queue for development and testing.
///
/// All state sits behind one `parking_lot` mutex with brief critical sections;
/// a `Notify` wakes idle consumers when work arrives.
pub struct InMemoryJobQueue {
    name: String,
    max_depth: Option<usize>,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl InMemoryJobQueue {
    /// Create an unbounded queue.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_depth: None,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    /// Reject enqueues once waiting plus delayed jobs reach `max_depth`.
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Jobs that exhausted their attempts and were retained.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().failed.clone()
    }

    /// Completed jobs that were retained.
    #[must_use]
    pub fn completed_jobs(&self) -> Vec<Job> {
        self.state.lock().completed.clone()
    }

    /// Take the next waiting job without waiting.
    fn try_take(&self) -> Take {
        let mut state = self.state.lock();
        state.promote_due(Instant::now());
        match state.waiting.pop_front() {
            Some(job) => {
                state.active.insert(job.id.clone(), job.clone());
                Take::Job(job)
            }
            None => Take::Idle(state.next_due()),
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(
        &self,
        name: &str,
        data: Value,
        options: JobOptions,
    ) -> Result<JobId, WorkerError> {
        let id = uuid::Uuid::new_v4().to_string();
        {
            let mut state = self.state.lock();
            if let Some(max) = self.max_depth {
                if state.pending() >= max {
                    tracing::warn!(queue = %self.name, depth = state.pending(), "queue full");
                    return Err(WorkerError::Queue("max queue depth reached".into()));
                }
            }
            state.waiting.push_back(Job {
                id: id.clone(),
                name: name.to_string(),
                data,
                attempts_made: 0,
                options,
                created_at_ms: now_ms(),
            });
        }
        self.notify.notify_one();
        tracing::debug!(queue = %self.name, job_id = %id, "job enqueued");
        Ok(id)
    }

    async fn dequeue(&self) -> Result<Job, WorkerError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before inspecting state so an enqueue in between is not missed.
            notified.as_mut().enable();

            let next_due = match self.try_take() {
                Take::Job(job) => return Ok(job),
                Take::Idle(next_due) => next_due,
            };

            match next_due {
                Some(at) => {
                    tokio::select! {
                        () = &mut notified => {}
                        () = tokio::time::sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn job_counts(&self) -> Result<JobCounts, WorkerError> {
        let mut state = self.state.lock();
        state.promote_due(Instant::now());
        Ok(JobCounts {
            waiting: state.waiting.len() as u64,
            active: state.active.len() as u64,
            delayed: state.delayed.len() as u64,
            completed: state.completed.len() as u64,
            failed: state.failed.len() as u64,
        })
    }

    async fn complete(&self, job: &Job) -> Result<(), WorkerError> {
        let mut state = self.state.lock();
        let Some(job) = state.active.remove(&job.id) else {
            return Err(WorkerError::Queue(format!("job {} is not active", job.id)));
        };
        if !job.options.remove_on_complete {
            state.completed.push(job);
        }
        Ok(())
    }

    async fn fail(&self, job: Job, reason: &str) -> Result<FailureDisposition, WorkerError> {
        let disposition = {
            let mut state = self.state.lock();
            let Some(mut job) = state.active.remove(&job.id) else {
                return Err(WorkerError::Queue(format!("job {} is not active", job.id)));
            };
            job.attempts_made += 1;

            if job.attempts_made < job.options.attempts {
                let delay = job.options.backoff.delay_for(job.attempts_made);
                let attempt = job.attempts_made + 1;
                tracing::warn!(
                    queue = %self.name,
                    job_id = %job.id,
                    attempt,
                    max_attempts = job.options.attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    reason,
                    "job failed, scheduling retry"
                );
                state.delayed.push((Instant::now() + delay, job));
                FailureDisposition::Retrying { attempt, delay }
            } else {
                tracing::error!(
                    queue = %self.name,
                    job_id = %job.id,
                    attempts = job.attempts_made,
                    reason,
                    "job exhausted its attempts and was dead-lettered"
                );
                if !job.options.remove_on_fail {
                    state.failed.push(DeadLetter {
                        job,
                        reason: reason.to_string(),
                        failed_at_ms: now_ms(),
                    });
                }
                FailureDisposition::DeadLettered
            }
        };
        if matches!(disposition, FailureDisposition::Retrying { .. }) {
            // Idle consumers recompute their wake-up deadline.
            self.notify.notify_one();
        }
        Ok(disposition)
    }
}
