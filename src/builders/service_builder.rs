//! Builder wiring queue, staging, ledger and observers into a service.

use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::core::{
    BatchFlusher, Counters, EventBroadcaster, Intake, JobHandler, JobQueue, LoanLedger,
    LoanProcessor, PoolScaler, StagingStore, WorkerError,
};
use crate::infra::{InMemoryJobQueue, InMemoryLedger, InMemoryStagingStore, ObserverHub};
use crate::runtime::LoanService;

/// Assembles a [`LoanService`].
///
/// Backends not supplied fall back to the in-memory implementations.
///
/// ```rust,ignore
/// use loanq::builders::ServiceBuilder;
/// use loanq::config::ServiceConfig;
///
/// let service = ServiceBuilder::new(ServiceConfig::from_env()?)
///     .with_store(redis_store)
///     .build()?;
/// service.run(cancel).await?;
/// ```
pub struct ServiceBuilder {
    config: ServiceConfig,
    queue: Option<Arc<dyn JobQueue>>,
    store: Option<Arc<dyn StagingStore>>,
    ledger: Option<Arc<dyn LoanLedger>>,
    handler: Option<Arc<dyn JobHandler>>,
}

impl ServiceBuilder {
    /// Start from `config`.
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            queue: None,
            store: None,
            ledger: None,
            handler: None,
        }
    }

    /// Use `queue` for loan jobs.
    #[must_use]
    pub fn with_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Use `store` for staging and counters.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn StagingStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `ledger` as the flush target.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<dyn LoanLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Run `handler` on every job instead of the loan processor.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Validate the configuration and wire the components.
    ///
    /// # Errors
    ///
    /// `WorkerError::Config` if the configuration is invalid.
    pub fn build(self) -> Result<LoanService, WorkerError> {
        self.config
            .validate()
            .map_err(|e| WorkerError::Config(format!("config invalid: {e}")))?;

        let queue = self
            .queue
            .unwrap_or_else(|| Arc::new(InMemoryJobQueue::new(self.config.queue_name.clone())));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStagingStore::new()));
        let ledger = self
            .ledger
            .unwrap_or_else(|| Arc::new(InMemoryLedger::new()));

        let counters = Counters::new(Arc::clone(&store));
        let broadcaster = Arc::new(EventBroadcaster::new(
            Arc::new(ObserverHub::new()),
            counters.clone(),
        ));
        let handler = self.handler.unwrap_or_else(|| {
            Arc::new(LoanProcessor::new(
                Arc::clone(&store),
                counters.clone(),
                broadcaster.clone(),
            ))
        });
        let scaler = Arc::new(PoolScaler::new(
            self.config.scaler.clone(),
            Arc::clone(&queue),
            handler,
        ));
        let intake = Intake::new(Arc::clone(&queue), counters.clone());
        let flusher = Arc::new(BatchFlusher::new(Arc::clone(&store), ledger));

        tracing::debug!(queue = %self.config.queue_name, "loan service assembled");
        Ok(LoanService::new(
            self.config,
            queue,
            counters,
            broadcaster,
            scaler,
            intake,
            flusher,
        ))
    }
}
