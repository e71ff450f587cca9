//! The assembled loan service and its run loop.

use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "ws")]
use anyhow::Context;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::core::{
    AppResult, BatchFlusher, Counters, EventBroadcaster, Intake, JobId, JobQueue, PoolScaler,
    WorkerError,
};
use crate::infra::ObserverHub;

/// A fully wired worker pool with intake, observers and flushing.
///
/// Built by [`ServiceBuilder`](crate::builders::ServiceBuilder).
pub struct LoanService {
    config: ServiceConfig,
    queue: Arc<dyn JobQueue>,
    counters: Counters,
    broadcaster: Arc<EventBroadcaster<ObserverHub>>,
    scaler: Arc<PoolScaler>,
    intake: Intake,
    flusher: Arc<BatchFlusher>,
}

impl LoanService {
    pub(crate) fn new(
        config: ServiceConfig,
        queue: Arc<dyn JobQueue>,
        counters: Counters,
        broadcaster: Arc<EventBroadcaster<ObserverHub>>,
        scaler: Arc<PoolScaler>,
        intake: Intake,
        flusher: Arc<BatchFlusher>,
    ) -> Self {
        Self {
            config,
            queue,
            counters,
            broadcaster,
            scaler,
            intake,
            flusher,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The job queue.
    #[must_use]
    pub const fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Shared counters.
    #[must_use]
    pub const fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Observer registry.
    #[must_use]
    pub fn observers(&self) -> &Arc<ObserverHub> {
        self.broadcaster.channel()
    }

    /// Event broadcaster.
    #[must_use]
    pub const fn broadcaster(&self) -> &Arc<EventBroadcaster<ObserverHub>> {
        &self.broadcaster
    }

    /// The pool scaler.
    #[must_use]
    pub const fn scaler(&self) -> &Arc<PoolScaler> {
        &self.scaler
    }

    /// The batch flusher.
    #[must_use]
    pub const fn flusher(&self) -> &Arc<BatchFlusher> {
        &self.flusher
    }

    /// Submit a loan request through intake.
    ///
    /// # Errors
    ///
    /// See [`Intake::submit`].
    pub async fn submit(&self, payload: Value) -> Result<JobId, WorkerError> {
        self.intake.submit(payload).await
    }

    /// Run every loop until `cancel` fires, then drain the pool and flush
    /// once more.
    ///
    /// # Errors
    ///
    /// Binding the WebSocket listener failed.
    pub async fn run(&self, cancel: CancellationToken) -> AppResult<()> {
        let mut tasks = Vec::new();

        if let Some(task) = self.start_websocket(cancel.clone()).await? {
            tasks.push(task);
        }

        tasks.push(self.broadcaster.spawn_incoming_poller(
            Duration::from_millis(self.config.events.poll_interval_ms),
            cancel.clone(),
        ));

        let flusher = Arc::clone(&self.flusher);
        let flush_every = Duration::from_millis(self.config.flush.interval_ms);
        let flush_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            flusher.run(flush_every, flush_cancel).await;
        }));

        tracing::info!(queue = %self.config.queue_name, "loan service running");
        self.scaler.run(cancel).await;

        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }
        match self.flusher.flush_once().await {
            Ok(report) => tracing::info!(
                accepted = report.accepted,
                failed = report.failed,
                "final flush complete"
            ),
            Err(e) => tracing::error!(error = %e, "final flush failed, records stay staged"),
        }
        tracing::info!("loan service stopped");
        Ok(())
    }

    #[cfg(feature = "ws")]
    async fn start_websocket(&self, cancel: CancellationToken) -> AppResult<Option<JoinHandle<()>>> {
        let Some(addr) = &self.config.events.bind_addr else {
            return Ok(None);
        };
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding websocket listener on {addr}"))?;
        let broadcaster = Arc::clone(&self.broadcaster);
        Ok(Some(tokio::spawn(async move {
            if let Err(e) =
                crate::infra::observers::serve_websocket(listener, broadcaster, cancel).await
            {
                tracing::error!(error = %e, "websocket listener failed");
            }
        })))
    }

    #[cfg(not(feature = "ws"))]
    #[allow(clippy::unused_async)]
    async fn start_websocket(&self, _cancel: CancellationToken) -> AppResult<Option<JoinHandle<()>>> {
        if self.config.events.bind_addr.is_some() {
            tracing::warn!("bind_addr is set but the `ws` feature is disabled");
        }
        Ok(None)
    }
}
