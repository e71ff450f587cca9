//! Builders to construct the loan service from configuration.

pub mod service_builder;

pub use service_builder::ServiceBuilder;
