//! Long-running service that drives the pool, observers and flushing.

pub mod service;

pub use service::LoanService;
