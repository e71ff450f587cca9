//! # loanq
//!
//! A self-scaling job-queue worker pool for loan applications.
//!
//! Loan requests are enqueued on a durable queue. A periodic control loop
//! watches the backlog and grows or shrinks a pool of concurrent consumers.
//! Each consumer runs a pure validation pipeline on one application, stages
//! the outcome in a key/value store, bumps a counter and broadcasts an event
//! to connected observers. A flusher later moves staged outcomes into a
//! durable ledger.
//!
//! ## Core Problem Solved
//!
//! - **Elastic consumption**: worker count follows `ceil(waiting / batch_size)`,
//!   capped at `max_workers`, and never drops a job that is in flight
//! - **At-least-once delivery**: staging keys derive from the loan or job id,
//!   so a redelivered job overwrites its record instead of duplicating it
//! - **Advisory telemetry**: counters and events are best effort; the staged
//!   record is the source of truth
//!
//! ## Pipeline
//!
//! ```text
//! Intake -> JobQueue -> PoolScaler -> WorkerHandle -> LoanProcessor
//!                                                   |-> StagingStore + Counters
//!                                                   |-> EventBroadcaster -> observers
//! StagingStore -> BatchFlusher -> LoanLedger
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use loanq::builders::ServiceBuilder;
//! use loanq::config::ServiceConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! loanq::util::init_tracing();
//! let service = ServiceBuilder::new(ServiceConfig::from_env()?).build()?;
//! let job_id = service.submit(serde_json::json!({
//!     "loanId": "L1",
//!     "application": {"name": "A", "age": 30, "email": "a@b.com", "phone": "1234567890"},
//!     "amount": 1000, "income": 500, "creditScore": 700, "purpose": "x"
//! })).await?;
//!
//! let cancel = CancellationToken::new();
//! service.run(cancel.clone()).await?;
//! ```
//!
//! ## Feature flags
//!
//! - `ws` (default): WebSocket observer transport
//! - `redis`: Redis-backed staging store
//!
//! For complete examples, see:
//! - `tests/pipeline_test.rs` - end-to-end scenarios
//! - `tests/worker_pool_test.rs` - scaling and draining

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core pipeline abstractions: jobs, decisions, workers and scaling.
pub mod core;
/// Configuration models for the scaler, observers, and flushing.
pub mod config;
/// Builders to construct the loan service from configuration.
pub mod builders;
/// Infrastructure adapters for queues, staging, observers, and the ledger.
pub mod infra;
/// Long-running service that drives the pool, observers and flushing.
pub mod runtime;
/// Shared utilities.
pub mod util;
