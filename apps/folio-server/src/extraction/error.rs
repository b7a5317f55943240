//! Extraction error types
//!
//! Format problems never surface here: extractors turn them into
//! diagnostics. Errors are reserved for requests that cannot be attempted
//! at all and for cancellation.

use thiserror::Error;

/// Extraction error type
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// No extractor for this file name
    #[error("Unsupported format: {0}")]
    Unsupported(String),

    /// The caller cancelled the extraction
    #[error("Extraction cancelled")]
    Cancelled,

    /// Blocking task could not be joined
    #[error("Extraction task failed: {0}")]
    Task(String),
}

/// Result type alias for extraction operations
pub type Result<T> = std::result::Result<T, ExtractionError>;

impl From<tokio::task::JoinError> for ExtractionError {
    fn from(err: tokio::task::JoinError) -> Self {
        ExtractionError::Task(err.to_string())
    }
}
