use std::fmt;
use thiserror::Error;

/// One offending input field with a caller-facing message.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("patient validation failed ({} field(s)): {}", .0.len(), join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("no feasible candidate for {route}: {detail}")]
    Contraindication { route: &'static str, detail: String },

    /// Internal invariant violated. Display stays generic; the detail has
    /// already been written to the error log at the raise site.
    #[error("internal computation error")]
    Computation(String),
}

impl PlanError {
    /// Raise a computation error, logging the diagnostic detail server-side
    /// while Display remains generic.
    pub fn computation(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        log::error!("computation error: {}", detail);
        PlanError::Computation(detail)
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type PlanResult<T> = Result<T, PlanError>;
