//! Ingestion worker
//!
//! A single polling loop that claims one job at a time and drives it end to
//! end: load the upload, extract, normalize text, persist assets and
//! chapters, index, lint, and record the outcome. While a job runs a
//! supervisor task refreshes its heartbeat and cancels the job when the
//! worker shuts down or loses ownership of it.

mod assets;
mod error;
mod lint;
mod slug;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{Config, WorkerConfig};
use crate::db::{EditionContent, IngestionJob, JobRepository, JobStatus, LibraryRepository, NewChapter};
use crate::extraction::{
    CancelToken, ContentUnit, ExtractionDiagnostics, ExtractionMetadata, ExtractionOptions, ExtractionRequest,
    ExtractorRegistry, SourceFormat, TextSource, WarningCode,
};
use crate::pipeline::{ProcessingContext, TextPipeline};
use crate::search::{SearchDocument, SearchIndexer};
use crate::storage::{content_key, BlobStore};

pub use assets::{asset_url, extension_for, normalize_reference, store_images, AssetIndex};
pub use error::IngestError;
pub use lint::{lint_chapters, LintFinding};
pub use slug::{slugify, SlugAllocator};

/// Outcome of one processed job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub job_id: String,
    pub status: JobStatus,
    pub units_count: usize,
    pub error: Option<String>,
}

/// Background ingestion worker
pub struct IngestionWorker {
    db: SqlitePool,
    store: Arc<dyn BlobStore>,
    registry: Arc<ExtractorRegistry>,
    pipeline: Arc<TextPipeline>,
    indexer: Arc<dyn SearchIndexer>,
    options: ExtractionOptions,
    config: WorkerConfig,
    site: String,
    text_pass_budget: Duration,
}

impl IngestionWorker {
    pub fn new(
        db: SqlitePool,
        store: Arc<dyn BlobStore>,
        registry: Arc<ExtractorRegistry>,
        indexer: Arc<dyn SearchIndexer>,
        config: &Config,
    ) -> Self {
        Self {
            db,
            store,
            registry,
            pipeline: Arc::new(TextPipeline::standard()),
            indexer,
            options: config.extraction.clone(),
            config: config.worker.clone(),
            site: config.search.site.clone(),
            text_pass_budget: config.text_pass_budget,
        }
    }

    /// Replace the text pipeline
    pub fn with_pipeline(mut self, pipeline: TextPipeline) -> Self {
        self.pipeline = Arc::new(pipeline);
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Poll until `shutdown` is cancelled
    pub async fn run(self: Arc<Self>, shutdown: CancelToken) {
        tracing::info!(worker_id = %self.config.worker_id, "Ingestion worker started");
        let mut next_reap = Instant::now();

        while !shutdown.is_cancelled() {
            if Instant::now() >= next_reap {
                if let Err(e) = self.reap_stale().await {
                    tracing::warn!("Stale job reaping failed: {}", e);
                }
                next_reap = Instant::now() + self.config.heartbeat_interval;
            }

            let idle = match self.run_once(&shutdown).await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    tracing::error!("Failed to claim ingestion job: {}", e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        tracing::info!(worker_id = %self.config.worker_id, "Ingestion worker stopped");
    }

    /// Claim and process at most one job
    pub async fn run_once(&self, shutdown: &CancelToken) -> crate::error::Result<Option<JobReport>> {
        if shutdown.is_cancelled() {
            return Ok(None);
        }
        let Some(job) = JobRepository::new(&self.db).claim_next(&self.config.worker_id).await? else {
            return Ok(None);
        };

        tracing::info!(
            job_id = %job.id,
            edition_id = %job.edition_id,
            file = %job.file_name,
            attempt = job.attempt_count,
            "Claimed ingestion job"
        );

        let job_cancel = CancelToken::new();
        let supervisor = self.spawn_supervisor(job.id.clone(), shutdown.clone(), job_cancel.clone());
        let report = self.process(&job, &job_cancel).await;
        supervisor.abort();

        Ok(Some(report))
    }

    /// Fail `Processing` jobs whose worker stopped heartbeating
    pub async fn reap_stale(&self) -> crate::error::Result<Vec<String>> {
        let stale_after =
            chrono::Duration::from_std(self.config.stale_after).unwrap_or_else(|_| chrono::Duration::days(365));
        let cutoff = Utc::now() - stale_after;
        let reaped = JobRepository::new(&self.db).reap_stale(cutoff).await?;
        for id in &reaped {
            tracing::warn!(job_id = %id, "Reaped stale ingestion job");
        }
        Ok(reaped)
    }

    fn spawn_supervisor(&self, job_id: String, shutdown: CancelToken, job_cancel: CancelToken) -> JoinHandle<()> {
        let db = self.db.clone();
        let worker_id = self.config.worker_id.clone();
        let period = self.config.heartbeat_interval.max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The claim itself set the first heartbeat
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!(job_id = %job_id, "Shutdown requested, cancelling job");
                        job_cancel.cancel();
                        return;
                    }
                    _ = ticker.tick() => {
                        match JobRepository::new(&db).heartbeat(&job_id, &worker_id).await {
                            Ok(true) => {}
                            Ok(false) => {
                                tracing::warn!(job_id = %job_id, "Job no longer owned by this worker, cancelling");
                                job_cancel.cancel();
                                return;
                            }
                            Err(e) => tracing::warn!(job_id = %job_id, "Heartbeat failed: {}", e),
                        }
                    }
                }
            }
        })
    }

    /// Run a claimed job and record its terminal status
    pub async fn process(&self, job: &IngestionJob, cancel: &CancelToken) -> JobReport {
        let started = Instant::now();
        let jobs = JobRepository::new(&self.db);
        let worker_id = self.config.worker_id.as_str();

        let (written, units_count, error) = match self.ingest(job, cancel).await {
            Ok(units) => {
                let written = jobs.mark_succeeded(&job.id, worker_id).await;
                tracing::info!(
                    job_id = %job.id,
                    edition_id = %job.edition_id,
                    units,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Ingestion succeeded"
                );
                (written.map(|ok| ok.then_some(JobStatus::Succeeded)), units, None)
            }
            Err(err) => {
                let message = err.to_job_error();
                tracing::error!(
                    job_id = %job.id,
                    edition_id = %job.edition_id,
                    reason = err.reason(),
                    "Ingestion failed: {}",
                    err
                );
                let written = jobs.mark_failed(&job.id, worker_id, &message).await;
                (written.map(|ok| ok.then_some(JobStatus::Failed)), 0, Some(message))
            }
        };

        let status = match written {
            Ok(Some(status)) => status,
            // Someone else settled the job (reaper); report what is stored
            Ok(None) => match jobs.get(&job.id).await {
                Ok(Some(stored)) => {
                    tracing::warn!(job_id = %job.id, status = %stored.status, "Job settled by another party");
                    stored.status().unwrap_or(JobStatus::Failed)
                }
                _ => JobStatus::Failed,
            },
            Err(e) => {
                tracing::error!(job_id = %job.id, "Failed to record job outcome: {}", e);
                JobStatus::Processing
            }
        };

        JobReport {
            job_id: job.id.clone(),
            status,
            units_count,
            error,
        }
    }

    async fn ingest(&self, job: &IngestionJob, cancel: &CancelToken) -> Result<usize, IngestError> {
        let jobs = JobRepository::new(&self.db);

        let data = self.store.get(&job.file_key).await?;
        cancel.check()?;

        let request = ExtractionRequest::new(data, job.file_name.clone(), self.options.clone());
        let mut result = self.registry.extract(request, cancel).await?;
        tracing::info!(
            job_id = %job.id,
            format = %result.format,
            units = result.units.len(),
            text_source = result.diagnostics.text_source.as_str(),
            warnings = result.diagnostics.warnings.len(),
            "Extraction finished"
        );
        self.record(&jobs, job, result.format, result.units.len(), &result.diagnostics)
            .await?;

        if result.diagnostics.text_source == TextSource::None {
            return Err(no_text_error(&result.diagnostics));
        }
        cancel.check()?;

        let units = std::mem::take(&mut result.units);
        let units = self.normalize(units, result.metadata.language.as_deref()).await?;
        if units.is_empty() {
            return Err(IngestError::NoTextLayer(
                "every unit was empty after text normalization".to_string(),
            ));
        }
        cancel.check()?;

        let assets = store_images(self.store.as_ref(), &job.edition_id, &result.images).await?;
        let asset_index = AssetIndex::new(&job.edition_id, &assets);
        let chapters = build_chapters(&units, &asset_index)?;
        let cover_path = self.store_cover(&job.edition_id, &result.metadata).await?;
        cancel.check()?;

        let content = EditionContent {
            title: result.metadata.title.clone(),
            authors: result.metadata.authors.clone(),
            language: result.metadata.language.clone(),
            description: result.metadata.description.clone(),
            source_format: result.format,
            cover_path: cover_path.clone(),
            assets,
            chapters,
        };
        LibraryRepository::new(&self.db).persist(&job.edition_id, &content).await?;

        let documents = self.search_documents(&job.edition_id, &result.metadata, cover_path.as_deref(), &content.chapters);
        self.indexer.index_edition(&job.edition_id, &documents).await?;

        lint_chapters(&job.edition_id, &content.chapters);

        let units_count = content.chapters.len();
        self.record(&jobs, job, result.format, units_count, &result.diagnostics)
            .await?;
        Ok(units_count)
    }

    async fn record(
        &self,
        jobs: &JobRepository<'_>,
        job: &IngestionJob,
        format: SourceFormat,
        units: usize,
        diagnostics: &ExtractionDiagnostics,
    ) -> Result<(), IngestError> {
        let owned = jobs
            .record_diagnostics(&job.id, &self.config.worker_id, Some(format), Some(units), diagnostics)
            .await?;
        if owned {
            Ok(())
        } else {
            Err(IngestError::WorkerLost(
                "job is no longer processing under this worker".to_string(),
            ))
        }
    }

    async fn normalize(&self, units: Vec<ContentUnit>, language: Option<&str>) -> Result<Vec<ContentUnit>, IngestError> {
        let pipeline = self.pipeline.clone();
        let ctx = ProcessingContext::new(language).with_budget(self.text_pass_budget);
        tokio::task::spawn_blocking(move || normalize_units(&pipeline, units, &ctx))
            .await
            .map_err(|e| IngestError::Parse(format!("text normalization failed: {}", e)))
    }

    async fn store_cover(&self, edition_id: &str, metadata: &ExtractionMetadata) -> Result<Option<String>, IngestError> {
        let Some(data) = metadata.cover_image.as_deref().filter(|d| !d.is_empty()) else {
            return Ok(None);
        };
        let mime_type = metadata.cover_mime_type.as_deref().unwrap_or("image/jpeg");
        let key = content_key(&format!("covers/{}", edition_id), data, &extension_for(mime_type, ""));
        self.store.put(&key, data, mime_type).await?;
        tracing::debug!(edition_id, key = %key, bytes = data.len(), "Stored cover");
        Ok(Some(key))
    }

    fn search_documents(
        &self,
        edition_id: &str,
        metadata: &ExtractionMetadata,
        cover_path: Option<&str>,
        chapters: &[NewChapter],
    ) -> Vec<SearchDocument> {
        chapters
            .iter()
            .map(|chapter| {
                let mut meta = BTreeMap::new();
                meta.insert("chapterId".to_string(), chapter.id.clone());
                meta.insert("chapterNumber".to_string(), chapter.chapter_number.to_string());
                meta.insert("chapterSlug".to_string(), chapter.slug.clone());
                meta.insert("editionId".to_string(), edition_id.to_string());
                if let Some(title) = &metadata.title {
                    meta.insert("editionTitle".to_string(), title.clone());
                }
                if !metadata.authors.is_empty() {
                    meta.insert("authors".to_string(), metadata.authors.join(", "));
                }
                if let Some(cover) = cover_path {
                    meta.insert("coverPath".to_string(), cover.to_string());
                }
                SearchDocument {
                    id: chapter.id.clone(),
                    title: chapter.title.clone(),
                    content: chapter.plain_text.clone(),
                    language: metadata.language.clone(),
                    site: self.site.clone(),
                    metadata: meta,
                }
            })
            .collect()
    }
}

/// Failure for a result without text: format errors stay `parse_error`
fn no_text_error(diagnostics: &ExtractionDiagnostics) -> IngestError {
    let parse_failure = diagnostics
        .warnings
        .iter()
        .find(|w| w.code == WarningCode::ParseError);
    if let Some(warning) = parse_failure {
        return IngestError::Parse(warning.message.clone());
    }

    let mut message = "no extractable text".to_string();
    if diagnostics.has_warning(WarningCode::OcrPageLimitExceeded) {
        message.push_str(" (page count exceeds the OCR limit)");
    }
    IngestError::NoTextLayer(message)
}

/// Run the text pipeline over every unit, dropping units it empties
fn normalize_units(pipeline: &TextPipeline, units: Vec<ContentUnit>, ctx: &ProcessingContext) -> Vec<ContentUnit> {
    let mut normalized: Vec<ContentUnit> = Vec::with_capacity(units.len());
    for unit in units {
        let html = match &unit.html {
            Some(html) => html.clone(),
            None => crate::html::text_to_html(&unit.plain_text),
        };
        let processed = pipeline.process(&html, ctx);
        if processed.trim().is_empty() {
            tracing::info!(unit = unit.order_index, title = ?unit.title, "Dropped unit emptied by text normalization");
            continue;
        }

        let mut next = ContentUnit::from_html(unit.unit_type, unit.title, processed, normalized.len());
        next.original_chapter_number = unit.original_chapter_number;
        next.part_number = unit.part_number;
        next.total_parts = unit.total_parts;
        normalized.push(next);
    }
    normalized
}

/// Map units to chapter rows with rewritten image references
fn build_chapters(units: &[ContentUnit], assets: &AssetIndex) -> Result<Vec<NewChapter>, IngestError> {
    let mut slugs = SlugAllocator::new();
    units
        .iter()
        .enumerate()
        .map(|(i, unit)| {
            let number = i + 1;
            let (html, _) = assets.rewrite(unit.html.as_deref().unwrap_or_default())?;
            let title = unit.display_title();
            Ok(NewChapter {
                id: Uuid::new_v4().to_string(),
                chapter_number: number as i64,
                slug: slugs.allocate(&title, number),
                title,
                html,
                plain_text: unit.plain_text.clone(),
                word_count: unit.word_count as i64,
                unit_type: unit.unit_type,
                original_chapter_number: unit.original_chapter_number.map(|n| n as i64),
                part_number: unit.part_number.map(|n| n as i64),
                total_parts: unit.total_parts.map(|n| n as i64),
            })
        })
        .collect()
}
