use thiserror::Error;

/// A single failed intake check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ReviewError {
    /// Intake data failed validation; every violated field is listed.
    #[error("invalid record: {}", join_violations(.0))]
    Validation(Vec<FieldViolation>),

    /// The aggregation window holds no records.
    #[error("no reviews found in the requested window")]
    NoData,

    /// A window length whose start falls outside the representable range.
    #[error("a window of {0} days is out of range")]
    WindowOutOfRange(i64),

    /// Aggregate or record data reaching the analyzer broke its contract.
    #[error("analysis failed: {0}")]
    Analysis(String),

    /// Failure reported by the dispatch collaborator.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ReviewError {
    /// Ordered, user-visible error messages.
    pub fn messages(&self) -> Vec<String> {
        match self {
            ReviewError::Validation(violations) => {
                violations.iter().map(|v| v.message.clone()).collect()
            }
            other => vec![other.to_string()],
        }
    }

    /// Names of the fields a validation failure covers, in check order.
    pub fn violated_fields(&self) -> Vec<&'static str> {
        match self {
            ReviewError::Validation(violations) => violations.iter().map(|v| v.field).collect(),
            _ => Vec::new(),
        }
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, ReviewError>;
