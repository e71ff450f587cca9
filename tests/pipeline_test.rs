//! End-to-end tests for the loan pipeline
//!
//! Intake enqueues, the scaler sizes the pool, workers run the processor, and
//! observers receive events. Covers:
//! - Accepted and rejected loan scenarios
//! - Redelivery idempotence
//! - Retry with backoff on staging failures, then dead-lettering
//! - Counter monotonicity over randomized payloads

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loanq::config::ScalerConfig;
use loanq::core::{
    decide, Backoff, CounterKind, Counters, Decision, ErrorCode, EventBroadcaster, Intake, Job,
    JobOptions, JobQueue, LoanProcessor, Outcome, PoolScaler, StagingStore, WorkerError,
    ACCEPTED_SET, FAILED_SET,
};
use loanq::infra::{InMemoryJobQueue, InMemoryStagingStore, ObserverHub};
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

// ============================================================================
// HELPERS
// ============================================================================

struct Pipeline {
    queue: Arc<InMemoryJobQueue>,
    store: Arc<dyn StagingStore>,
    counters: Counters,
    intake: Intake,
    scaler: PoolScaler,
    events: UnboundedReceiver<String>,
}

fn pipeline_with(store: Arc<dyn StagingStore>, options: JobOptions) -> Pipeline {
    let queue = Arc::new(InMemoryJobQueue::new("loans"));
    let counters = Counters::new(Arc::clone(&store));
    let hub = Arc::new(ObserverHub::new());
    let (_observer, events) = hub.register();
    let broadcaster = Arc::new(EventBroadcaster::new(hub, counters.clone()));
    let processor = Arc::new(LoanProcessor::new(
        Arc::clone(&store),
        counters.clone(),
        broadcaster,
    ));
    let scaler = PoolScaler::new(
        ScalerConfig {
            tick_interval_ms: 10,
            batch_size: 50,
            max_workers: 10,
            worker_concurrency: 10,
        },
        queue.clone(),
        processor,
    );
    let intake = Intake::new(queue.clone(), counters.clone()).with_options(options);
    Pipeline {
        queue,
        store,
        counters,
        intake,
        scaler,
        events,
    }
}

fn pipeline() -> Pipeline {
    pipeline_with(Arc::new(InMemoryStagingStore::new()), JobOptions::default())
}

fn loan(loan_id: &str, credit_score: i64) -> Value {
    json!({
        "loanId": loan_id,
        "application": {"name": "A", "age": 30, "email": "a@b.com", "phone": "1234567890"},
        "amount": 1000,
        "income": 500,
        "creditScore": credit_score,
        "purpose": "x"
    })
}

async fn wait_for(counters: &Counters, kind: CounterKind, at_least: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while counters.read(kind).await.unwrap() < at_least {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("counter did not reach target");
}

async fn next_event(rx: &mut UnboundedReceiver<String>) -> Value {
    let raw = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no event")
        .expect("channel closed");
    serde_json::from_str(&raw).unwrap()
}

fn job(id: &str, data: Value) -> Job {
    Job {
        id: id.into(),
        name: "loan_request".into(),
        data,
        attempts_made: 0,
        options: JobOptions::default(),
        created_at_ms: 0,
    }
}

/// Store that fails the first `failures` writes.
struct FlakyStore {
    inner: InMemoryStagingStore,
    failures: AtomicUsize,
}

impl FlakyStore {
    fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryStagingStore::new(),
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl StagingStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WorkerError> {
        self.inner.get(key).await
    }
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), WorkerError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(WorkerError::Store("connection reset".into()));
        }
        self.inner.set(key, value).await
    }
    async fn delete(&self, key: &str) -> Result<(), WorkerError> {
        self.inner.delete(key).await
    }
    async fn add_to_set(&self, set_key: &str, member: &str) -> Result<bool, WorkerError> {
        self.inner.add_to_set(set_key, member).await
    }
    async fn remove_from_set(&self, set_key: &str, member: &str) -> Result<bool, WorkerError> {
        self.inner.remove_from_set(set_key, member).await
    }
    async fn members_of(&self, set_key: &str) -> Result<Vec<String>, WorkerError> {
        self.inner.members_of(set_key).await
    }
    async fn increment_counter(&self, name: &str) -> Result<u64, WorkerError> {
        self.inner.increment_counter(name).await
    }
    async fn get_counter(&self, name: &str) -> Result<u64, WorkerError> {
        self.inner.get_counter(name).await
    }
    async fn increment_once(&self, name: &str, marker: &str) -> Result<Option<u64>, WorkerError> {
        self.inner.increment_once(name, marker).await
    }
    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool, WorkerError> {
        self.inner.delete_if_equals(key, expected).await
    }
}

fn quick_retry(attempts: u32) -> JobOptions {
    JobOptions {
        attempts,
        backoff: Backoff::Exponential { delay_ms: 10 },
        remove_on_complete: true,
        remove_on_fail: false,
    }
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_good_credit_is_accepted_end_to_end() {
    let mut p = pipeline();
    let job_id = p.intake.submit(loan("L1", 700)).await.unwrap();
    p.scaler.tick().await.unwrap();
    wait_for(&p.counters, CounterKind::Processed, 1).await;

    assert!(p.store.get("accepted-loan:L1").await.unwrap().is_some());
    assert_eq!(
        p.store.members_of(ACCEPTED_SET).await.unwrap(),
        vec!["accepted-loan:L1".to_string()]
    );
    assert_eq!(p.counters.read(CounterKind::Incoming).await.unwrap(), 1);
    assert_eq!(p.counters.read(CounterKind::Failed).await.unwrap(), 0);

    let success = next_event(&mut p.events).await;
    assert_eq!(success["type"], "success");
    assert_eq!(success["loanId"], "L1");
    assert_eq!(success["jobId"], job_id.as_str());
    let count = next_event(&mut p.events).await;
    assert_eq!(count["type"], "count:processed");
    assert_eq!(count["count"], 1);

    p.scaler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_low_credit_is_rejected_end_to_end() {
    let mut p = pipeline();
    let job_id = p.intake.submit(loan("L1", 550)).await.unwrap();
    p.scaler.tick().await.unwrap();
    wait_for(&p.counters, CounterKind::Failed, 1).await;

    let key = format!("failed-loans:LOW_CREDIT_SCORE:{job_id}");
    assert!(p.store.get(&key).await.unwrap().is_some());
    assert_eq!(p.store.members_of(FAILED_SET).await.unwrap(), vec![key]);
    assert_eq!(p.counters.read(CounterKind::Processed).await.unwrap(), 0);

    let error = next_event(&mut p.events).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["error"], "LOW_CREDIT_SCORE");
    assert_eq!(error["message"], "Credit score too low");

    // A rejection is not a queue failure.
    let counts = p.queue.job_counts().await.unwrap();
    assert_eq!((counts.delayed, counts.failed), (0, 0));
    p.scaler.shutdown().await;
}

#[tokio::test]
async fn test_redelivery_yields_one_record() {
    let store: Arc<dyn StagingStore> = Arc::new(InMemoryStagingStore::new());
    let counters = Counters::new(Arc::clone(&store));
    let hub = Arc::new(ObserverHub::new());
    let processor = LoanProcessor::new(
        Arc::clone(&store),
        counters.clone(),
        Arc::new(EventBroadcaster::new(hub, counters.clone())),
    );

    let rejected = job("j-7", loan("L2", 550));
    let first = processor.process(&rejected).await.unwrap();
    let first_record = store.get("failed-loans:LOW_CREDIT_SCORE:j-7").await.unwrap();
    let second = processor.process(&rejected).await.unwrap();

    assert!(matches!(first, Outcome::Rejected { first_delivery: true, .. }));
    assert!(matches!(second, Outcome::Rejected { first_delivery: false, .. }));
    assert_eq!(store.members_of(FAILED_SET).await.unwrap().len(), 1);
    assert_eq!(counters.read(CounterKind::Failed).await.unwrap(), 1);
    assert!(first_record.is_some());
}

// ============================================================================
// RETRIES
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_store_failure_is_retried() {
    let p = pipeline_with(Arc::new(FlakyStore::new(1)), quick_retry(3));
    p.intake.submit(loan("L3", 700)).await.unwrap();
    p.scaler.tick().await.unwrap();

    wait_for(&p.counters, CounterKind::Processed, 1).await;
    assert!(p.store.get("accepted-loan:L3").await.unwrap().is_some());
    assert!(p.queue.dead_letters().is_empty());
    p.scaler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_persistent_failure_is_dead_lettered() {
    let p = pipeline_with(Arc::new(FlakyStore::new(usize::MAX)), quick_retry(2));
    let job_id = p.intake.submit(loan("L4", 700)).await.unwrap();
    p.scaler.tick().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while p.queue.dead_letters().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let dead = p.queue.dead_letters();
    assert_eq!(dead[0].job.id, job_id);
    assert_eq!(dead[0].job.attempts_made, 2);
    assert!(dead[0].reason.contains("connection reset"));
    assert_eq!(p.counters.read(CounterKind::Processed).await.unwrap(), 0);
    p.scaler.shutdown().await;
}

// ============================================================================
// PROPERTIES
// ============================================================================

fn random_payload(rng: &mut impl Rng, i: usize) -> Value {
    let mut payload = json!({
        "loanId": format!("R{i}"),
        "application": {
            "name": "Applicant",
            "age": rng.random_range(18..80),
            "email": "someone@example.com",
            "phone": "5551234567"
        },
        "amount": rng.random_range(100..50_000),
        "income": rng.random_range(0..20_000),
        "creditScore": rng.random_range(300..850),
        "purpose": "home"
    });
    if rng.random_bool(0.1) {
        if let Some(map) = payload.as_object_mut() {
            map.remove("purpose");
        }
    }
    payload
}

fn expected_code(payload: &Value) -> Option<ErrorCode> {
    if payload.get("purpose").is_none() {
        return Some(ErrorCode::InvalidDataFormat);
    }
    let score = payload["creditScore"].as_i64().unwrap();
    let amount = payload["amount"].as_f64().unwrap();
    let income = payload["income"].as_f64().unwrap();
    if score < 600 {
        Some(ErrorCode::LowCreditScore)
    } else if amount > 5.0 * income {
        Some(ErrorCode::LoanAmountHigh)
    } else {
        None
    }
}

#[test]
fn test_random_payloads_decide_by_rule_order() {
    let mut rng = rand::rng();
    for i in 0..500 {
        let payload = random_payload(&mut rng, i);
        let decision = decide(&payload);
        assert_eq!(decision.error_code(), expected_code(&payload), "payload {payload}");
        if let Decision::Accepted(app) = decision {
            assert_eq!(app.loan_id, format!("R{i}"));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_counters_are_monotonic_and_balanced() {
    let p = pipeline();
    let payloads: Vec<Value> = {
        let mut rng = rand::rng();
        (0..200).map(|i| random_payload(&mut rng, i)).collect()
    };
    let accepted = payloads.iter().filter(|p| expected_code(p).is_none()).count() as u64;
    let total = payloads.len() as u64;

    for payload in payloads {
        p.intake.submit(payload).await.unwrap();
    }
    p.scaler.tick().await.unwrap();

    let mut last = (0, 0);
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let processed = p.counters.read(CounterKind::Processed).await.unwrap();
            let failed = p.counters.read(CounterKind::Failed).await.unwrap();
            let incoming = p.counters.read(CounterKind::Incoming).await.unwrap();
            assert!(processed >= last.0 && failed >= last.1);
            assert!(incoming >= processed + failed);
            last = (processed, failed);
            if processed + failed == total {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(last.0, accepted);
    assert_eq!(last.1, total - accepted);
    p.scaler.shutdown().await;
}
