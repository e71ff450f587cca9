//! Tests for the service run loop

use std::time::Duration;

use loanq::builders::ServiceBuilder;
use loanq::config::ServiceConfig;
use loanq::core::CounterKind;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn quick_config() -> ServiceConfig {
    let mut cfg = ServiceConfig::default();
    cfg.scaler.tick_interval_ms = 20;
    cfg.events.poll_interval_ms = 20;
    cfg.events.bind_addr = None;
    cfg.flush.interval_ms = 60_000;
    cfg
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_processes_and_drains_on_cancel() {
    let service = std::sync::Arc::new(ServiceBuilder::new(quick_config()).build().unwrap());
    let cancel = CancellationToken::new();
    let runner = {
        let service = service.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { service.run(cancel).await })
    };

    service
        .submit(json!({
            "loanId": "L1",
            "application": {"name": "A", "age": 30, "email": "a@b.com", "phone": "1234567890"},
            "amount": 1000, "income": 500, "creditScore": 700, "purpose": "x"
        }))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while service.counters().read(CounterKind::Processed).await.unwrap() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(service.scaler().worker_count(), 0);
}
