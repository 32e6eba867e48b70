use std::path::PathBuf;

use thiserror::Error;

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Unknown case: {0}")]
    UnknownCase(String),

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("At least one URL has to be provided!")]
    MissingIdentifiers,

    #[error("Query execution failed: {0}")]
    QueryExecution(#[from] sqlx::Error),

    #[error("Failed to write {}: {source}", .destination.display())]
    SinkWrite {
        destination: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Case {case} aborted: {message}")]
    TaskAborted { case: String, message: String },
}

impl ReportError {
    /// Option validation failures are reported before any query runs.
    pub fn is_option_error(&self) -> bool {
        matches!(
            self,
            ReportError::InvalidDateRange(_) | ReportError::MissingIdentifiers
        )
    }
}
