//! Backlog-driven worker pool sizing.
//!
//! Each tick reads the waiting count, computes the desired worker count with
//! [`desired_workers`], and applies the difference from [`reconcile`] to the
//! registry. Only one tick runs at a time; the registry is never touched
//! outside a tick or [`PoolScaler::shutdown`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::ScalerConfig;
use crate::core::{JobHandler, JobQueue, WorkerError, WorkerHandle, WorkerId};

/// Workers needed for `waiting` jobs: `ceil(waiting / batch_size)`, capped at
/// `max_workers`.
#[must_use]
pub fn desired_workers(waiting: u64, batch_size: u64, max_workers: usize) -> usize {
    if waiting == 0 || max_workers == 0 {
        return 0;
    }
    let needed = waiting.div_ceil(batch_size.max(1));
    usize::try_from(needed).map_or(max_workers, |n| n.min(max_workers))
}

/// Change to apply to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleAction {
    /// Pool is the right size.
    Hold,
    /// Spawn this many workers.
    Grow(usize),
    /// Close this many workers.
    Shrink(usize),
}

/// Difference between the desired and current worker counts.
#[must_use]
pub const fn reconcile(desired: usize, current: usize) -> ScaleAction {
    if desired > current {
        ScaleAction::Grow(desired - current)
    } else if desired < current {
        ScaleAction::Shrink(current - desired)
    } else {
        ScaleAction::Hold
    }
}

/// Result of one scaling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was in progress; nothing was done.
    Skipped,
    /// The tick ran.
    Applied {
        /// Waiting jobs observed.
        waiting: u64,
        /// Target worker count.
        desired: usize,
        /// Action taken.
        action: ScaleAction,
        /// Worker count after the tick.
        workers: usize,
    },
}

/// Periodic controller owning the worker registry.
pub struct PoolScaler {
    config: ScalerConfig,
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    registry: Mutex<BTreeMap<WorkerId, WorkerHandle>>,
    worker_count: AtomicUsize,
    next_id: AtomicU64,
    root: CancellationToken,
}

impl PoolScaler {
    /// Create a scaler with an empty pool.
    pub fn new(config: ScalerConfig, queue: Arc<dyn JobQueue>, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            config,
            queue,
            handler,
            registry: Mutex::new(BTreeMap::new()),
            worker_count: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            root: CancellationToken::new(),
        }
    }

    /// Scaling parameters.
    #[must_use]
    pub const fn config(&self) -> &ScalerConfig {
        &self.config
    }

    /// Registered workers, as of the last completed registry change.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count.load(Ordering::Acquire)
    }

    /// Ids of registered workers in spawn order. Waits for a running tick.
    pub async fn worker_ids(&self) -> Vec<WorkerId> {
        self.registry.lock().await.keys().copied().collect()
    }

    /// Run one scaling step.
    ///
    /// # Errors
    ///
    /// Queue errors while reading the backlog; the pool is left unchanged.
    pub async fn tick(&self) -> Result<TickOutcome, WorkerError> {
        let Ok(mut registry) = self.registry.try_lock() else {
            tracing::debug!("scaling tick already in progress");
            return Ok(TickOutcome::Skipped);
        };
        if self.root.is_cancelled() {
            return Err(WorkerError::Shutdown);
        }

        let waiting = self.queue.waiting_count().await?;
        let current = registry.len();
        let desired = desired_workers(waiting, self.config.batch_size, self.config.max_workers);
        let action = reconcile(desired, current);

        match action {
            ScaleAction::Hold => {}
            ScaleAction::Grow(n) => {
                for _ in 0..n {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
                    let handle = WorkerHandle::spawn(
                        id,
                        self.config.worker_concurrency,
                        Arc::clone(&self.queue),
                        Arc::clone(&self.handler),
                        self.root.child_token(),
                    );
                    registry.insert(id, handle);
                    self.worker_count.store(registry.len(), Ordering::Release);
                }
            }
            ScaleAction::Shrink(n) => {
                for _ in 0..n {
                    let Some((&id, _)) = registry.last_key_value() else { break };
                    if let Some(handle) = registry.get_mut(&id) {
                        if let Err(e) = handle.close().await {
                            tracing::warn!(worker_id = id, error = %e, "worker did not close cleanly");
                        }
                    }
                    registry.remove(&id);
                    self.worker_count.store(registry.len(), Ordering::Release);
                }
            }
        }

        let workers = registry.len();
        if action == ScaleAction::Hold {
            tracing::trace!(waiting, workers, "pool size unchanged");
        } else {
            tracing::info!(waiting, desired, current, workers, ?action, "pool rescaled");
        }
        Ok(TickOutcome::Applied {
            waiting,
            desired,
            action,
            workers,
        })
    }

    /// Tick every configured interval until `cancel` fires, then drain the
    /// pool.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            tick_ms = self.config.tick_interval_ms,
            batch_size = self.config.batch_size,
            max_workers = self.config.max_workers,
            "pool scaler started"
        );
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.tick().await {
                tracing::warn!(error = %e, "scaling tick failed");
            }
        }
        self.shutdown().await;
    }

    /// Close every worker, waiting for in-flight jobs. Later ticks fail with
    /// `WorkerError::Shutdown`.
    pub async fn shutdown(&self) {
        self.root.cancel();
        let mut registry = self.registry.lock().await;
        let drained = registry.len();
        while let Some((id, mut handle)) = registry.pop_last() {
            if let Err(e) = handle.close().await {
                tracing::warn!(worker_id = id, error = %e, "worker did not close cleanly");
            }
            self.worker_count.store(registry.len(), Ordering::Release);
        }
        tracing::info!(drained, "pool scaler stopped");
    }
}

impl std::fmt::Debug for PoolScaler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolScaler")
            .field("config", &self.config)
            .field("workers", &self.worker_count())
            .finish_non_exhaustive()
    }
}
