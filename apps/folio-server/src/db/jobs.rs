//! Ingestion job queue
//!
//! Jobs move `Queued -> Processing -> Succeeded | Failed`. Every transition
//! is a conditional `UPDATE` whose row count says whether it happened, so
//! several workers can share one queue without double-processing a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::now;
use crate::error::Result;
use crate::extraction::{ExtractionDiagnostics, SourceFormat, Warning};

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Processing => "Processing",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Queued" => Some(Self::Queued),
            "Processing" => Some(Self::Processing),
            "Succeeded" => Some(Self::Succeeded),
            "Failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Queue a job was submitted to; public ingestion is claimed first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobQueue {
    Public,
    #[default]
    User,
}

impl JobQueue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::User => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "public" => Some(Self::Public),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

/// Ingestion job record
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct IngestionJob {
    pub id: String,
    pub edition_id: String,
    pub file_key: String,
    pub file_name: String,
    pub queue: String,
    pub status: String,
    pub attempt_count: i64,
    pub error: Option<String>,
    pub source_format: Option<String>,
    pub units_count: Option<i64>,
    pub text_source: Option<String>,
    pub confidence: Option<f64>,
    /// JSON array of `Warning`
    #[serde(skip)]
    pub warnings: String,
    pub worker_id: Option<String>,
    pub heartbeat_at: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl IngestionJob {
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::parse(&self.status)
    }

    pub fn warnings(&self) -> Vec<Warning> {
        serde_json::from_str(&self.warnings).unwrap_or_default()
    }
}

/// New job request
#[derive(Debug, Clone)]
pub struct CreateJob {
    pub edition_id: String,
    pub file_key: String,
    pub file_name: String,
    pub queue: JobQueue,
}

const JOB_COLUMNS: &str = "id, edition_id, file_key, file_name, queue, status, attempt_count, error, \
    source_format, units_count, text_source, confidence, warnings, worker_id, heartbeat_at, \
    started_at, finished_at, created_at, updated_at";

/// Ingestion job repository
pub struct JobRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> JobRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a `Queued` job
    pub async fn create(&self, job: &CreateJob) -> Result<IngestionJob> {
        let id = Uuid::new_v4().to_string();
        let now = now();

        sqlx::query(
            r#"
            INSERT INTO ingestion_jobs (id, edition_id, file_key, file_name, queue, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'Queued', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&job.edition_id)
        .bind(&job.file_key)
        .bind(&job.file_name)
        .bind(job.queue.as_str())
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| crate::error::AppError::Internal("Failed to create job".to_string()))
    }

    /// Get a specific job
    pub async fn get(&self, id: &str) -> Result<Option<IngestionJob>> {
        let job = sqlx::query_as::<_, IngestionJob>(&format!(
            "SELECT {} FROM ingestion_jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(job)
    }

    /// Claim the oldest queued job, public queue first
    ///
    /// The status guard in the `WHERE` clause makes the claim exactly-once:
    /// a job another worker claimed first no longer matches and no row is
    /// returned.
    pub async fn claim_next(&self, worker_id: &str) -> Result<Option<IngestionJob>> {
        let now = now();
        let job = sqlx::query_as::<_, IngestionJob>(&format!(
            r#"
            UPDATE ingestion_jobs
            SET status = 'Processing',
                attempt_count = attempt_count + 1,
                worker_id = ?,
                heartbeat_at = ?,
                started_at = ?,
                finished_at = NULL,
                error = NULL,
                source_format = NULL,
                units_count = NULL,
                text_source = NULL,
                confidence = NULL,
                warnings = '[]',
                updated_at = ?
            WHERE id = (
                SELECT id FROM ingestion_jobs
                WHERE status = 'Queued'
                ORDER BY CASE queue WHEN 'public' THEN 0 ELSE 1 END, created_at, id
                LIMIT 1
            )
            AND status = 'Queued'
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(worker_id)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .fetch_optional(self.pool)
        .await?;

        Ok(job)
    }

    /// Claim one specific job; `false` if it was not `Queued`
    pub async fn claim(&self, id: &str, worker_id: &str) -> Result<bool> {
        let now = now();
        let result = sqlx::query(
            r#"
            UPDATE ingestion_jobs
            SET status = 'Processing', attempt_count = attempt_count + 1, worker_id = ?,
                heartbeat_at = ?, started_at = ?, finished_at = NULL, error = NULL, updated_at = ?
            WHERE id = ? AND status = 'Queued'
            "#,
        )
        .bind(worker_id)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Refresh the heartbeat; `false` once the job is no longer ours
    pub async fn heartbeat(&self, id: &str, worker_id: &str) -> Result<bool> {
        let now = now();
        let result = sqlx::query(
            r#"
            UPDATE ingestion_jobs SET heartbeat_at = ?, updated_at = ?
            WHERE id = ? AND worker_id = ? AND status = 'Processing'
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .bind(worker_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record extraction diagnostics while the job is still processing
    pub async fn record_diagnostics(
        &self,
        id: &str,
        worker_id: &str,
        format: Option<SourceFormat>,
        units_count: Option<usize>,
        diagnostics: &ExtractionDiagnostics,
    ) -> Result<bool> {
        let warnings = serde_json::to_string(&diagnostics.warnings).unwrap_or_else(|_| "[]".to_string());
        let result = sqlx::query(
            r#"
            UPDATE ingestion_jobs
            SET source_format = ?, units_count = ?, text_source = ?, confidence = ?, warnings = ?, updated_at = ?
            WHERE id = ? AND worker_id = ? AND status = 'Processing'
            "#,
        )
        .bind(format.map(|f| f.as_str()))
        .bind(units_count.map(|n| n as i64))
        .bind(diagnostics.text_source.as_str())
        .bind(diagnostics.confidence)
        .bind(warnings)
        .bind(now())
        .bind(id)
        .bind(worker_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `Processing -> Succeeded`
    pub async fn mark_succeeded(&self, id: &str, worker_id: &str) -> Result<bool> {
        self.finish(id, worker_id, JobStatus::Succeeded, None).await
    }

    /// `Processing -> Failed`, keeping whatever diagnostics were recorded
    pub async fn mark_failed(&self, id: &str, worker_id: &str, error: &str) -> Result<bool> {
        self.finish(id, worker_id, JobStatus::Failed, Some(error)).await
    }

    async fn finish(&self, id: &str, worker_id: &str, status: JobStatus, error: Option<&str>) -> Result<bool> {
        let now = now();
        let result = sqlx::query(
            r#"
            UPDATE ingestion_jobs
            SET status = ?, error = ?, finished_at = ?, updated_at = ?
            WHERE id = ? AND worker_id = ? AND status = 'Processing'
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .bind(worker_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Explicit retry: `Failed -> Queued`, a no-op from any other status
    pub async fn retry(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE ingestion_jobs
            SET status = 'Queued', error = NULL, worker_id = NULL, heartbeat_at = NULL,
                started_at = NULL, finished_at = NULL, updated_at = ?
            WHERE id = ? AND status = 'Failed'
            "#,
        )
        .bind(now())
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Fail `Processing` jobs whose heartbeat is older than `cutoff`
    ///
    /// Returns the ids of the reaped jobs.
    pub async fn reap_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let now = now();
        let cutoff = super::timestamp(cutoff);
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE ingestion_jobs
            SET status = 'Failed', error = ?, finished_at = ?, updated_at = ?
            WHERE status = 'Processing' AND (heartbeat_at IS NULL OR heartbeat_at < ?)
            RETURNING id
            "#,
        )
        .bind(format!("worker_lost: no heartbeat since {}", cutoff))
        .bind(&now)
        .bind(&now)
        .bind(&cutoff)
        .fetch_all(self.pool)
        .await?;

        Ok(ids)
    }
}
