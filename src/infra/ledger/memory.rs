//! In-memory loan ledger for development and testing.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{
    AcceptedLoan, ErrorCode, FailedLoan, FailedLoanFilter, FailedRecord, LoanError, LoanLedger,
    WorkerError,
};
use crate::util::clock::now_ms;

#[derive(Default)]
struct Inner {
    loans: Vec<AcceptedLoan>,
    failed: Vec<FailedLoan>,
    next_row: u64,
    next_error: u64,
}

/// Ledger holding rows in process memory.
#[derive(Default)]
pub struct InMemoryLedger {
    inner: Mutex<Inner>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All accepted loans in insertion order.
    #[must_use]
    pub fn accepted_loans(&self) -> Vec<AcceptedLoan> {
        self.inner.lock().loans.clone()
    }

    /// Failed loans matching `filter`, most recent first.
    #[must_use]
    pub fn failed_loans(&self, filter: &FailedLoanFilter) -> Vec<FailedLoan> {
        let inner = self.inner.lock();
        let mut rows: Vec<FailedLoan> = inner
            .failed
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.failed_at.cmp(&a.failed_at).then(b.id.cmp(&a.id)));
        rows
    }

    /// Every error annotation across all failed loans.
    #[must_use]
    pub fn loan_errors(&self) -> Vec<LoanError> {
        self.inner
            .lock()
            .failed
            .iter()
            .flat_map(|row| row.errors.iter().cloned())
            .collect()
    }

    /// Set the review flag on a failed loan; returns `false` if no such row.
    pub fn set_flagged(&self, id: u64, flagged: bool) -> bool {
        self.update(id, |row| row.flagged = flagged)
    }

    /// Mark a failed loan as resubmitted; returns `false` if no such row.
    pub fn mark_retried(&self, id: u64) -> bool {
        self.update(id, |row| row.retried = true)
    }

    fn update(&self, id: u64, f: impl FnOnce(&mut FailedLoan)) -> bool {
        let mut inner = self.inner.lock();
        inner.failed.iter_mut().find(|row| row.id == id).map(f).is_some()
    }
}

fn annotation(inner: &mut Inner, code: ErrorCode) -> LoanError {
    inner.next_error += 1;
    LoanError {
        id: inner.next_error,
        code,
    }
}

#[async_trait]
impl LoanLedger for InMemoryLedger {
    async fn persist_accepted(&self, loans: &[AcceptedLoan]) -> Result<usize, WorkerError> {
        self.inner.lock().loans.extend_from_slice(loans);
        Ok(loans.len())
    }

    async fn persist_failed(&self, records: &[FailedRecord]) -> Result<usize, WorkerError> {
        let failed_at = now_ms();
        let mut inner = self.inner.lock();
        for record in records {
            inner.next_row += 1;
            let id = inner.next_row;
            let error = annotation(&mut inner, record.error_code);
            inner.failed.push(FailedLoan {
                id,
                record: record.clone(),
                flagged: false,
                retried: false,
                failed_at,
                errors: vec![error],
            });
        }
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(job: &str, loan: &str, code: ErrorCode) -> FailedRecord {
        FailedRecord {
            job_id: job.into(),
            error_code: code,
            details: String::new(),
            payload: json!({"loanId": loan}),
            captured_at: 0,
        }
    }

    #[tokio::test]
    async fn test_failed_rows_get_one_annotation() {
        let ledger = InMemoryLedger::new();
        ledger
            .persist_failed(&[
                record("1", "A", ErrorCode::LowCreditScore),
                record("2", "B", ErrorCode::LoanAmountHigh),
            ])
            .await
            .unwrap();

        let rows = ledger.failed_loans(&FailedLoanFilter::default());
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.errors.len() == 1 && !r.flagged && !r.retried));
        assert_eq!(rows[0].id, 2, "newest first");
        assert_eq!(ledger.loan_errors().len(), 2);
    }

    #[tokio::test]
    async fn test_flag_and_retry_are_queryable() {
        let ledger = InMemoryLedger::new();
        ledger
            .persist_failed(&[record("1", "A", ErrorCode::LowCreditScore)])
            .await
            .unwrap();

        assert!(ledger.set_flagged(1, true));
        assert!(ledger.mark_retried(1));
        assert!(!ledger.mark_retried(99));

        let flagged = FailedLoanFilter { flagged: Some(true), retried: Some(true), ..Default::default() };
        assert_eq!(ledger.failed_loans(&flagged).len(), 1);
        let by_loan = FailedLoanFilter { loan_id: Some("B".into()), ..Default::default() };
        assert!(ledger.failed_loans(&by_loan).is_empty());
    }
}
