//! Staged record shapes shared by the processor and the batch flusher.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{ErrorCode, JobId, LoanApplication};

/// Normalized record of an accepted loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedLoan {
    /// Loan identifier.
    pub loan_id: String,
    /// Applicant name.
    pub name: String,
    /// Applicant age.
    pub age: i64,
    /// Applicant email.
    pub email: String,
    /// Applicant phone.
    pub phone: String,
    /// Requested amount.
    pub amount: f64,
    /// Declared income.
    pub income: f64,
    /// Credit score.
    pub credit_score: i64,
    /// Loan purpose.
    pub purpose: String,
    /// Staging time, ms since epoch.
    pub created_at: u64,
}

impl AcceptedLoan {
    /// Flatten an application into its staged form.
    #[must_use]
    pub fn from_application(app: &LoanApplication, created_at: u64) -> Self {
        Self {
            loan_id: app.loan_id.clone(),
            name: app.application.name.clone(),
            age: app.application.age,
            email: app.application.email.clone(),
            phone: app.application.phone.clone(),
            amount: app.amount,
            income: app.income,
            credit_score: app.credit_score,
            purpose: app.purpose.clone(),
            created_at,
        }
    }
}

/// Staged representation of a rejected job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRecord {
    /// Queue job identifier.
    pub job_id: JobId,
    /// Rejection code.
    pub error_code: ErrorCode,
    /// Rejection explanation.
    #[serde(default)]
    pub details: String,
    /// The payload exactly as it was enqueued.
    pub payload: Value,
    /// Capture time, ms since epoch.
    pub captured_at: u64,
}

impl FailedRecord {
    /// Loan id from the original payload, when present as a string.
    #[must_use]
    pub fn loan_id(&self) -> Option<&str> {
        self.payload.get("loanId").and_then(Value::as_str)
    }

    /// Applicant field from the original payload, when present as a string.
    #[must_use]
    pub fn applicant_field(&self, field: &str) -> Option<&str> {
        self.payload
            .get("application")
            .and_then(|a| a.get(field))
            .and_then(Value::as_str)
    }
}
