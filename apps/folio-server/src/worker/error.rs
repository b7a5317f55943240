//! Ingestion failure taxonomy

use thiserror::Error;

use crate::error::{AppError, StorageError};
use crate::extraction::ExtractionError;
use crate::search::SearchError;

/// Why a job failed
///
/// `reason()` is the stable code recorded in front of the message in the
/// job's `error` column.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0}")]
    Unsupported(String),

    #[error("{0}")]
    NoTextLayer(String),

    #[error("{0}")]
    Parse(String),

    #[error("{0}")]
    Io(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Database(String),

    #[error(transparent)]
    Index(#[from] SearchError),

    #[error("job cancelled")]
    Cancelled,

    #[error("{0}")]
    WorkerLost(String),
}

impl IngestError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Unsupported(_) => "unsupported",
            Self::NoTextLayer(_) => "no_text_layer",
            Self::Parse(_) => "parse_error",
            Self::Io(_) => "io_error",
            Self::Storage(_) => "storage_error",
            Self::Database(_) => "database_error",
            Self::Index(_) => "index_error",
            Self::Cancelled => "cancelled",
            Self::WorkerLost(_) => "worker_lost",
        }
    }

    /// `"<reason>: <message>"` as stored on the job
    pub fn to_job_error(&self) -> String {
        format!("{}: {}", self.reason(), self)
    }
}

impl From<ExtractionError> for IngestError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::Unsupported(name) => Self::Unsupported(format!("unsupported file type: {}", name)),
            ExtractionError::Cancelled => Self::Cancelled,
            ExtractionError::Task(message) => Self::Parse(message),
        }
    }
}

impl From<AppError> for IngestError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Storage(e) => Self::Storage(e),
            AppError::Io(e) => Self::Io(e.to_string()),
            AppError::Unsupported(message) => Self::Unsupported(message),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_error_format() {
        let err = IngestError::NoTextLayer("no extractable text".to_string());
        assert_eq!(err.to_job_error(), "no_text_layer: no extractable text");

        let err: IngestError = ExtractionError::Unsupported("notes.txt".to_string()).into();
        assert_eq!(err.reason(), "unsupported");

        let err: IngestError = StorageError::Missing("uploads/x".to_string()).into();
        assert_eq!(err.to_job_error(), "storage_error: Object not found: uploads/x");

        assert_eq!(IngestError::Cancelled.to_job_error(), "cancelled: job cancelled");
    }
}
