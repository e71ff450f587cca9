//! Configuration models for the scaler, observers, and flushing.

pub mod service;

pub use service::{EventsConfig, FlushConfig, ScalerConfig, ServiceConfig, ENV_PREFIX};
