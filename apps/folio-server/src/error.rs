//! Error types for the Folio server
//!
//! `AppError` is what HTTP handlers return; the ingestion worker maps the
//! same failures onto job reasons in `worker::IngestError`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// File name does not map to a supported book format
    #[error("Unsupported format: {0}")]
    Unsupported(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Blob store failures
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("No object under key {0}")]
    Missing(String),

    /// Empty, absolute or `..`-carrying key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Object store request failed: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::Storage(StorageError::Missing(_)) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Storage(StorageError::InvalidKey(_)) => StatusCode::BAD_REQUEST,
            AppError::Unsupported(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the response body
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) | AppError::Storage(StorageError::Missing(_)) => "not_found",
            AppError::BadRequest(_) | AppError::Storage(StorageError::InvalidKey(_)) => "bad_request",
            AppError::Unsupported(_) => "unsupported",
            AppError::Internal(_) => "internal_error",
            AppError::Storage(_) => "storage_error",
            AppError::Database(_) => "database_error",
            AppError::Io(_) => "io_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Server-side failures are logged in full and reported generically
        let message = if status.is_server_error() {
            tracing::error!(code = self.code(), "Request failed: {}", self);
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        (
            status,
            Json(ErrorBody {
                error: self.code(),
                message,
            }),
        )
            .into_response()
    }
}
