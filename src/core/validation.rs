//! Loan application validation pipeline.
//!
//! [`decide`] is a pure function from a raw job payload to a [`Decision`].
//! Checks run in a fixed order and the first failing stage wins:
//!
//! 1. schema and field constraints (`INVALID_DATA_FORMAT`)
//! 2. credit score threshold (`LOW_CREDIT_SCORE`)
//! 3. affordability, amount against income (`LOAN_AMOUNT_HIGH`)
//!
//! A rejection is data, not an error: nothing in this module performs I/O or
//! returns `Result`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lowest credit score that can be accepted.
pub const MIN_CREDIT_SCORE: i64 = 600;
/// Maximum loan amount as a multiple of declared income.
pub const MAX_INCOME_MULTIPLE: f64 = 5.0;

const MIN_AGE: i64 = 18;
const MIN_AMOUNT: f64 = 100.0;
const MIN_SCORE_FLOOR: i64 = 300;
const PHONE_LEN: std::ops::RangeInclusive<usize> = 10..=15;

/// Machine-readable rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Payload did not match the expected shape or field constraints.
    InvalidDataFormat,
    /// Credit score below [`MIN_CREDIT_SCORE`].
    LowCreditScore,
    /// Amount exceeds [`MAX_INCOME_MULTIPLE`] times income.
    LoanAmountHigh,
}

impl ErrorCode {
    /// Wire representation of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidDataFormat => "INVALID_DATA_FORMAT",
            Self::LowCreditScore => "LOW_CREDIT_SCORE",
            Self::LoanAmountHigh => "LOAN_AMOUNT_HIGH",
        }
    }

    /// Short human-readable description, used in broadcast messages.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::InvalidDataFormat => "Invalid data format",
            Self::LowCreditScore => "Credit score too low",
            Self::LoanAmountHigh => "Loan amount too high",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applicant details nested inside a loan request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Applicant {
    /// Full name.
    pub name: String,
    /// Age in years.
    pub age: i64,
    /// Contact email.
    pub email: String,
    /// Contact phone number.
    pub phone: String,
}

/// A loan request as carried in a job payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanApplication {
    /// Caller-supplied loan identifier, the idempotency key for staging.
    pub loan_id: String,
    /// Applicant details.
    pub application: Applicant,
    /// Requested amount.
    pub amount: f64,
    /// Declared income.
    pub income: f64,
    /// Credit score.
    pub credit_score: i64,
    /// Free-form purpose of the loan.
    pub purpose: String,
}

impl LoanApplication {
    /// Field-level constraint violations, empty when the record is well formed.
    #[must_use]
    pub fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.loan_id.trim().is_empty() {
            out.push("loanId: Loan ID is required".to_string());
        }
        if self.application.name.trim().is_empty() {
            out.push("application.name: Name is required".to_string());
        }
        if self.application.age < MIN_AGE {
            out.push(format!("application.age: Age must be at least {MIN_AGE}"));
        }
        if !is_email_shaped(&self.application.email) {
            out.push("application.email: Invalid email format".to_string());
        }
        let phone_len = self.application.phone.chars().count();
        if !PHONE_LEN.contains(&phone_len) {
            out.push(format!(
                "application.phone: Phone number must be {}-{} digits",
                PHONE_LEN.start(),
                PHONE_LEN.end()
            ));
        }
        if self.amount < MIN_AMOUNT {
            out.push(format!("amount: Amount must be at least {MIN_AMOUNT}"));
        }
        if self.income < 0.0 {
            out.push("income: Income must be a positive number".to_string());
        }
        if self.credit_score < MIN_SCORE_FLOOR {
            out.push(format!(
                "creditScore: Credit score must be at least {MIN_SCORE_FLOOR}"
            ));
        }
        if self.purpose.trim().is_empty() {
            out.push("purpose: Purpose is required".to_string());
        }
        out
    }
}

/// Verdict of the validation pipeline for one job attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// All checks passed.
    Accepted(LoanApplication),
    /// A check failed.
    Rejected {
        /// Which check failed.
        code: ErrorCode,
        /// Human-readable explanation.
        details: String,
    },
}

impl Decision {
    /// Whether the decision is an acceptance.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Rejection code, if any.
    #[must_use]
    pub const fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected { code, .. } => Some(*code),
        }
    }
}

/// Run the validation pipeline over a raw payload.
#[must_use]
pub fn decide(payload: &Value) -> Decision {
    let application = match LoanApplication::deserialize(payload) {
        Ok(app) => app,
        Err(e) => return reject(ErrorCode::InvalidDataFormat, e.to_string()),
    };

    let violations = application.violations();
    if !violations.is_empty() {
        return reject(ErrorCode::InvalidDataFormat, violations.join("; "));
    }

    if application.credit_score < MIN_CREDIT_SCORE {
        return reject(
            ErrorCode::LowCreditScore,
            format!(
                "credit score {} is below {MIN_CREDIT_SCORE}",
                application.credit_score
            ),
        );
    }

    if application.amount > MAX_INCOME_MULTIPLE * application.income {
        return reject(
            ErrorCode::LoanAmountHigh,
            format!(
                "amount {} exceeds {MAX_INCOME_MULTIPLE} x income {}",
                application.amount, application.income
            ),
        );
    }

    Decision::Accepted(application)
}

fn reject(code: ErrorCode, details: String) -> Decision {
    Decision::Rejected { code, details }
}

fn is_email_shaped(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let mut labels = 0usize;
    for label in domain.split('.') {
        if label.is_empty() {
            return false;
        }
        labels += 1;
    }
    labels >= 2
}
