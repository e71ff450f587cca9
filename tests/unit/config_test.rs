//! Tests for configuration validation

use std::collections::HashMap;

use loanq::config::{ScalerConfig, ServiceConfig};

#[test]
fn test_defaults_are_valid() {
    let cfg = ServiceConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.scaler.tick_interval_ms, 1000);
    assert_eq!(cfg.scaler.batch_size, 50);
    assert_eq!(cfg.scaler.max_workers, 10);
    assert_eq!(cfg.scaler.worker_concurrency, 10);
    assert_eq!(cfg.events.poll_interval_ms, 1000);
    assert_eq!(cfg.events.bind_addr.as_deref(), Some("0.0.0.0:8080"));
    assert_eq!(cfg.flush.interval_ms, 30_000);
}

#[test]
fn test_scaler_config_invalid_batch_size() {
    let invalid = ScalerConfig {
        batch_size: 0,
        ..ScalerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scaler_config_invalid_max_workers() {
    let invalid = ScalerConfig {
        max_workers: 0,
        ..ScalerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_service_config_invalid_bind_addr() {
    let mut cfg = ServiceConfig::default();
    cfg.events.bind_addr = Some("not an address".into());
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("bind_addr"));
}

#[test]
fn test_from_json_partial() {
    let cfg = ServiceConfig::from_json_str(r#"{"scaler": {"max_workers": 4}, "events": {"bind_addr": null}}"#)
        .unwrap();
    assert_eq!(cfg.scaler.max_workers, 4);
    assert_eq!(cfg.scaler.batch_size, 50);
    assert!(cfg.events.bind_addr.is_none());
}

#[test]
fn test_from_json_rejects_invalid() {
    assert!(ServiceConfig::from_json_str(r#"{"flush": {"interval_ms": 0}}"#).is_err());
    assert!(ServiceConfig::from_json_str("not json").is_err());
}

#[test]
fn test_from_lookup_overrides() {
    let vars: HashMap<&str, &str> = [
        ("LOANQ_MAX_WORKERS", "3"),
        ("LOANQ_BATCH_SIZE", " 25 "),
        ("LOANQ_BIND_ADDR", ""),
        ("LOANQ_QUEUE_NAME", "loans"),
    ]
    .into_iter()
    .collect();
    let cfg = ServiceConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string())).unwrap();
    assert_eq!(cfg.scaler.max_workers, 3);
    assert_eq!(cfg.scaler.batch_size, 25);
    assert_eq!(cfg.queue_name, "loans");
    assert!(cfg.events.bind_addr.is_none());
}

#[test]
fn test_from_lookup_bad_number() {
    let err = ServiceConfig::from_lookup(|k| (k == "LOANQ_TICK_INTERVAL_MS").then(|| "soon".to_string()))
        .unwrap_err();
    assert!(err.to_string().contains("LOANQ_TICK_INTERVAL_MS"));
}
