//! Error types for queue, staging and broadcast operations.

use thiserror::Error;

/// Infrastructure errors produced by worker pool components.
///
/// Domain rejections are never represented here; they are values of
/// [`Decision`](crate::core::Decision). Anything surfacing as a `WorkerError`
/// while a job is being processed is handed to the queue's retry policy.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Job queue backend failure.
    #[error("queue error: {0}")]
    Queue(String),
    /// Staging store backend failure.
    #[error("staging store error: {0}")]
    Store(String),
    /// Payload or record (de)serialization failure.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    /// Observer channel failure.
    #[error("event channel error: {0}")]
    Channel(String),
    /// Durable ledger failure during a flush.
    #[error("ledger error: {0}")]
    Ledger(String),
    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A worker task ended abnormally.
    #[error("worker error: {0}")]
    Worker(String),
    /// An intake request carried no payload.
    #[error("request payload is empty")]
    EmptyPayload,
    /// The component has been shut down.
    #[error("component has been shut down")]
    Shutdown,
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
