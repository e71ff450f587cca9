//! Service configuration structures.

use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "LOANQ_";

/// Pool scaler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalerConfig {
    /// Milliseconds between scaling ticks.
    pub tick_interval_ms: u64,
    /// Waiting jobs one worker is expected to absorb.
    pub batch_size: u64,
    /// Upper bound on workers.
    pub max_workers: usize,
    /// Jobs each worker runs concurrently.
    pub worker_concurrency: usize,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            batch_size: 50,
            max_workers: 10,
            worker_concurrency: 10,
        }
    }
}

impl ScalerConfig {
    /// Validate scaler values.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be greater than 0".into());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".into());
        }
        if self.max_workers == 0 {
            return Err("max_workers must be greater than 0".into());
        }
        if self.worker_concurrency == 0 {
            return Err("worker_concurrency must be greater than 0".into());
        }
        Ok(())
    }
}

/// Observer event configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Milliseconds between incoming-counter polls.
    pub poll_interval_ms: u64,
    /// WebSocket listen address; `None` disables the listener.
    pub bind_addr: Option<String>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            bind_addr: Some("0.0.0.0:8080".into()),
        }
    }
}

/// Batch flush configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    /// Milliseconds between flushes.
    pub interval_ms: u64,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self { interval_ms: 30_000 }
    }
}

/// Root service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name of the loan job queue.
    pub queue_name: String,
    /// Pool scaling.
    pub scaler: ScalerConfig,
    /// Observer events.
    pub events: EventsConfig,
    /// Ledger flushing.
    pub flush: FlushConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            queue_name: "loan-queue".into(),
            scaler: ScalerConfig::default(),
            events: EventsConfig::default(),
            flush: FlushConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_name.trim().is_empty() {
            return Err("queue_name must not be empty".into());
        }
        self.scaler
            .validate()
            .map_err(|e| format!("scaler invalid: {e}"))?;
        if self.events.poll_interval_ms == 0 {
            return Err("events invalid: poll_interval_ms must be greater than 0".into());
        }
        if let Some(addr) = &self.events.bind_addr {
            SocketAddr::from_str(addr)
                .map_err(|e| format!("events invalid: bind_addr `{addr}`: {e}"))?;
        }
        if self.flush.interval_ms == 0 {
            return Err("flush invalid: interval_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `LOANQ_*` variables, after loading `.env` if
    /// present.
    ///
    /// `LOANQ_BIND_ADDR` set to an empty string disables the WebSocket
    /// listener.
    ///
    /// # Errors
    ///
    /// Unparseable variables or an invalid result.
    pub fn from_env() -> AppResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through `lookup`, keyed by full variable name.
    ///
    /// # Errors
    ///
    /// Unparseable values or an invalid result.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let mut cfg = Self::default();
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("QUEUE_NAME") {
            cfg.queue_name = v;
        }
        parse_into(var("TICK_INTERVAL_MS"), "TICK_INTERVAL_MS", &mut cfg.scaler.tick_interval_ms)?;
        parse_into(var("BATCH_SIZE"), "BATCH_SIZE", &mut cfg.scaler.batch_size)?;
        parse_into(var("MAX_WORKERS"), "MAX_WORKERS", &mut cfg.scaler.max_workers)?;
        parse_into(var("WORKER_CONCURRENCY"), "WORKER_CONCURRENCY", &mut cfg.scaler.worker_concurrency)?;
        parse_into(var("POLL_INTERVAL_MS"), "POLL_INTERVAL_MS", &mut cfg.events.poll_interval_ms)?;
        parse_into(var("FLUSH_INTERVAL_MS"), "FLUSH_INTERVAL_MS", &mut cfg.flush.interval_ms)?;
        if let Some(addr) = var("BIND_ADDR") {
            cfg.events.bind_addr = if addr.trim().is_empty() { None } else { Some(addr) };
        }

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn parse_into<T>(raw: Option<String>, name: &str, target: &mut T) -> AppResult<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = raw {
        *target = raw
            .trim()
            .parse()
            .with_context(|| format!("{ENV_PREFIX}{name}=`{raw}` is not valid"))?;
    }
    Ok(())
}
