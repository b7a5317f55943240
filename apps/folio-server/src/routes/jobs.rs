//! Ingestion job routes
//!
//! Endpoints:
//! - GET /api/v1/jobs/:id - Job status and extraction diagnostics
//! - POST /api/v1/jobs/:id/retry - Requeue a failed job

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::db::{IngestionJob, JobRepository};
use crate::error::{AppError, Result};
use crate::extraction::Warning;
use crate::state::AppState;

/// Job with its decoded warnings
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    #[serde(flatten)]
    pub job: IngestionJob,
    pub warnings: Vec<Warning>,
}

impl From<IngestionJob> for JobResponse {
    fn from(job: IngestionJob) -> Self {
        let warnings = job.warnings();
        Self { job, warnings }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryResponse {
    /// False when the job was not `Failed` and nothing changed
    pub retried: bool,
    pub job: JobResponse,
}

/// Create the jobs router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_job))
        .route("/:id/retry", post(retry_job))
}

/// GET /api/v1/jobs/:id
async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<JobResponse>> {
    let job = JobRepository::new(state.db())
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;
    Ok(Json(job.into()))
}

/// POST /api/v1/jobs/:id/retry
async fn retry_job(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<RetryResponse>> {
    let repo = JobRepository::new(state.db());
    if repo.get(&id).await?.is_none() {
        return Err(AppError::NotFound(format!("Job {}", id)));
    }

    let retried = repo.retry(&id).await?;
    if retried {
        tracing::info!(job_id = %id, "Job requeued");
    } else {
        tracing::debug!(job_id = %id, "Retry ignored, job is not failed");
    }

    let job = repo
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;
    Ok(Json(RetryResponse {
        retried,
        job: job.into(),
    }))
}
