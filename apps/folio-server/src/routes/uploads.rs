//! Upload route
//!
//! Endpoints:
//! - POST /api/v1/uploads - Store a book file and queue its ingestion
//!
//! Multipart fields: `file` (required), `edition_id`, `queue` (`public` or
//! `user`). The format is decided from the file name before anything is
//! stored; other extensions are rejected.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Serialize;

use crate::db::{CreateEdition, CreateJob, JobQueue, JobRepository, LibraryRepository};
use crate::error::{AppError, Result};
use crate::extraction::SourceFormat;
use crate::state::AppState;
use crate::storage::content_key;

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Response for an accepted upload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub job_id: String,
    pub edition_id: String,
    pub status: String,
    pub file_key: String,
    pub format: SourceFormat,
}

/// Create the upload router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// POST /api/v1/uploads
async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Result<(StatusCode, Json<UploadResponse>)> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut edition_id: Option<String> = None;
    let mut queue = JobQueue::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field
                    .file_name()
                    .map(|s| s.to_string())
                    .ok_or_else(|| AppError::BadRequest("File field has no file name".to_string()))?;
                // Reject before reading the body
                if SourceFormat::from_file_name(&file_name).is_none() {
                    return Err(AppError::Unsupported(file_name));
                }
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file data: {}", e)))?;
                file = Some((file_name, data.to_vec()));
            }
            "edition_id" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let value = value.trim();
                if !value.is_empty() {
                    edition_id = Some(value.to_string());
                }
            }
            "queue" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                queue = JobQueue::parse(&value)
                    .ok_or_else(|| AppError::BadRequest(format!("Unknown queue: {}", value)))?;
            }
            other => tracing::debug!("Ignoring multipart field '{}'", other),
        }
    }

    let (file_name, data) = file.ok_or_else(|| AppError::BadRequest("Missing 'file' field".to_string()))?;
    if data.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
    }
    let format = SourceFormat::from_file_name(&file_name).ok_or_else(|| AppError::Unsupported(file_name.clone()))?;

    let file_key = content_key("uploads", &data, format.as_str());
    let content_type = mime_guess::from_path(&file_name).first_or_octet_stream();
    state.store().put(&file_key, &data, content_type.essence_str()).await?;

    let edition = LibraryRepository::new(state.db())
        .create_edition(&CreateEdition {
            id: edition_id,
            source_key: file_key.clone(),
            source_file_name: file_name.clone(),
        })
        .await?;

    let job = JobRepository::new(state.db())
        .create(&CreateJob {
            edition_id: edition.id.clone(),
            file_key: file_key.clone(),
            file_name,
            queue,
        })
        .await?;

    tracing::info!(
        job_id = %job.id,
        edition_id = %edition.id,
        format = %format,
        bytes = data.len(),
        queue = queue.as_str(),
        "Queued ingestion job"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            job_id: job.id,
            edition_id: edition.id,
            status: job.status,
            file_key,
            format,
        }),
    ))
}
