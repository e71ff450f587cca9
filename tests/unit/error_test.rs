//! Tests for error types

use loanq::core::WorkerError;

#[test]
fn test_store_error() {
    let err = WorkerError::Store("connection refused".to_string());
    assert_eq!(format!("{err}"), "staging store error: connection refused");
}

#[test]
fn test_queue_error() {
    let err = WorkerError::Queue("max queue depth reached".to_string());
    assert_eq!(format!("{err}"), "queue error: max queue depth reached");
}

#[test]
fn test_empty_payload_error() {
    assert_eq!(format!("{}", WorkerError::EmptyPayload), "request payload is empty");
}

#[test]
fn test_codec_error_from_serde() {
    let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: WorkerError = parse.into();
    assert!(matches!(err, WorkerError::Codec(_)));
    assert!(format!("{err}").starts_with("codec error:"));
}

#[test]
fn test_into_anyhow() {
    let app: loanq::core::AppResult<()> = Err(WorkerError::Shutdown.into());
    assert_eq!(app.unwrap_err().to_string(), "component has been shut down");
}
