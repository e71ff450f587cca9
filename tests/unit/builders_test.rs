//! Tests for the service builder

use std::sync::Arc;

use loanq::builders::ServiceBuilder;
use loanq::config::ServiceConfig;
use loanq::core::{CounterKind, JobQueue, WorkerError};
use loanq::infra::{InMemoryJobQueue, InMemoryStagingStore};
use serde_json::json;

#[test]
fn test_build_rejects_invalid_config() {
    let mut cfg = ServiceConfig::default();
    cfg.scaler.worker_concurrency = 0;
    let err = ServiceBuilder::new(cfg).build().err().unwrap();
    assert!(matches!(err, WorkerError::Config(_)));
}

#[tokio::test]
async fn test_build_uses_injected_backends() {
    let queue = Arc::new(InMemoryJobQueue::new("loans"));
    let store = Arc::new(InMemoryStagingStore::new());
    let service = ServiceBuilder::new(ServiceConfig::default())
        .with_queue(queue.clone())
        .with_store(store)
        .build()
        .unwrap();

    service.submit(json!({"loanId": "L1"})).await.unwrap();
    assert_eq!(queue.waiting_count().await.unwrap(), 1);
    assert_eq!(service.counters().read(CounterKind::Incoming).await.unwrap(), 1);
    assert_eq!(service.scaler().worker_count(), 0);
}
