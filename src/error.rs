use polars::prelude::PolarsError;
use thiserror::Error;

/// Failures that abort a reconciliation call.
///
/// Field-level parse failures and reference misses never surface here; they
/// degrade to documented defaults and are reported through diagnostics.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("source '{table}' is unavailable: {reason}")]
    SourceUnavailable { table: String, reason: String },

    #[error("source '{table}' did not load within {seconds}s")]
    SourceTimeout { table: String, seconds: u64 },

    #[error("source '{table}' is missing required columns: {}", columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },

    #[error("no usable transactions: {reason}")]
    NoUsableRows { reason: String },

    #[error("frame operation failed: {0}")]
    Frame(#[from] PolarsError),
}

impl ReconcileError {
    pub fn unavailable(table: &str, reason: impl ToString) -> Self {
        ReconcileError::SourceUnavailable {
            table: table.to_string(),
            reason: reason.to_string(),
        }
    }
}
