//! Durable ledger abstraction fed by the batch flusher.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{AcceptedLoan, ErrorCode, FailedRecord, WorkerError};

/// Durable store of decided loans.
///
/// Each call persists a whole batch or nothing; the flusher only clears
/// staging after a call returns `Ok`.
#[async_trait]
pub trait LoanLedger: Send + Sync + 'static {
    /// Persist accepted loans; returns how many rows were written.
    async fn persist_accepted(&self, loans: &[AcceptedLoan]) -> Result<usize, WorkerError>;

    /// Persist rejected loans with their error annotations.
    async fn persist_failed(&self, records: &[FailedRecord]) -> Result<usize, WorkerError>;
}

/// Error annotation attached to a failed loan row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanError {
    /// Ledger-assigned id.
    pub id: u64,
    /// Rejection code.
    pub code: ErrorCode,
}

/// Ledger row for a rejected loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedLoan {
    /// Ledger-assigned id.
    pub id: u64,
    /// The staged record as flushed.
    pub record: FailedRecord,
    /// Marked for manual review.
    pub flagged: bool,
    /// Resubmitted by an operator.
    pub retried: bool,
    /// When the row was written, ms since epoch.
    pub failed_at: u64,
    /// Error annotations, currently exactly one per row.
    pub errors: Vec<LoanError>,
}

/// Query over failed loan rows. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FailedLoanFilter {
    /// Exact loan id.
    pub loan_id: Option<String>,
    /// Exact applicant email.
    pub email: Option<String>,
    /// Exact applicant phone.
    pub phone: Option<String>,
    /// Flag state.
    pub flagged: Option<bool>,
    /// Retry state.
    pub retried: Option<bool>,
    /// Row carries an error annotation with this id.
    pub error_id: Option<u64>,
    /// Row carries an error annotation with this code.
    pub error_code: Option<ErrorCode>,
    /// Written at or after, ms since epoch.
    pub from_ms: Option<u64>,
    /// Written at or before, ms since epoch.
    pub to_ms: Option<u64>,
}

impl FailedLoanFilter {
    /// Whether `row` satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, row: &FailedLoan) -> bool {
        let eq = |want: &Option<String>, have: Option<&str>| {
            want.as_deref().is_none_or(|w| have == Some(w))
        };
        eq(&self.loan_id, row.record.loan_id())
            && eq(&self.email, row.record.applicant_field("email"))
            && eq(&self.phone, row.record.applicant_field("phone"))
            && self.flagged.is_none_or(|f| row.flagged == f)
            && self.retried.is_none_or(|r| row.retried == r)
            && self
                .error_id
                .is_none_or(|id| row.errors.iter().any(|e| e.id == id))
            && self
                .error_code
                .is_none_or(|code| row.errors.iter().any(|e| e.code == code))
            && self.from_ms.is_none_or(|from| row.failed_at >= from)
            && self.to_ms.is_none_or(|to| row.failed_at <= to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row() -> FailedLoan {
        FailedLoan {
            id: 1,
            record: FailedRecord {
                job_id: "j1".into(),
                error_code: ErrorCode::LoanAmountHigh,
                details: String::new(),
                payload: json!({"loanId": "L9", "application": {"email": "a@b.com", "phone": "1234567890"}}),
                captured_at: 10,
            },
            flagged: false,
            retried: false,
            failed_at: 100,
            errors: vec![LoanError { id: 4, code: ErrorCode::LoanAmountHigh }],
        }
    }

    #[test]
    fn test_empty_filter_matches_all() {
        assert!(FailedLoanFilter::default().matches(&row()));
    }

    #[test]
    fn test_field_filters() {
        let row = row();
        let by_loan = FailedLoanFilter { loan_id: Some("L9".into()), ..Default::default() };
        assert!(by_loan.matches(&row));
        let wrong_email = FailedLoanFilter { email: Some("x@y.com".into()), ..Default::default() };
        assert!(!wrong_email.matches(&row));
        let by_code = FailedLoanFilter {
            error_code: Some(ErrorCode::LowCreditScore),
            ..Default::default()
        };
        assert!(!by_code.matches(&row));
        let by_error = FailedLoanFilter { error_id: Some(4), flagged: Some(false), ..Default::default() };
        assert!(by_error.matches(&row));
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let row = row();
        let range = FailedLoanFilter { from_ms: Some(100), to_ms: Some(100), ..Default::default() };
        assert!(range.matches(&row));
        let after = FailedLoanFilter { from_ms: Some(101), ..Default::default() };
        assert!(!after.matches(&row));
    }
}
