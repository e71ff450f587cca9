//! Core pipeline abstractions: jobs, decisions, workers and scaling.

pub mod error;
pub mod events;
pub mod executor;
pub mod flush;
pub mod intake;
pub mod job;
pub mod ledger;
pub mod processor;
pub mod records;
pub mod scaler;
pub mod staging;
pub mod validation;
pub mod worker;

pub use error::{AppResult, WorkerError};
pub use events::{Broadcast, Event, EventBroadcaster, EventChannel, ObserverId};
pub use executor::JobHandler;
pub use flush::{BatchFlusher, FlushReport};
pub use intake::{Intake, LOAN_REQUEST_JOB};
pub use job::{Backoff, FailureDisposition, Job, JobCounts, JobId, JobOptions, JobQueue};
pub use ledger::{FailedLoan, FailedLoanFilter, LoanError, LoanLedger};
pub use processor::{LoanProcessor, Outcome};
pub use records::{AcceptedLoan, FailedRecord};
pub use scaler::{desired_workers, reconcile, PoolScaler, ScaleAction, TickOutcome};
pub use staging::{
    accepted_key, counted_key, failed_key, CounterKind, Counters, StagingStore, ACCEPTED_SET, FAILED_SET,
};
pub use validation::{
    decide, Applicant, Decision, ErrorCode, LoanApplication, MAX_INCOME_MULTIPLE,
    MIN_CREDIT_SCORE,
};
pub use worker::{WorkerHandle, WorkerId, WorkerReport};
