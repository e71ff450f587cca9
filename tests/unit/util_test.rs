//! Tests for utility functions

use loanq::util::{init_tracing, now_ms, DEFAULT_LOG_FILTER};

#[test]
fn test_now_ms_is_monotonic_enough() {
    let a = now_ms();
    let b = now_ms();
    assert!(b >= a);
    assert!(a > 1_600_000_000_000);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    assert!(DEFAULT_LOG_FILTER.starts_with("loanq"));
}
