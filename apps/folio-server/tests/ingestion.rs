//! End-to-end ingestion through the worker

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::*;
use folio_server::db::{self, CreateEdition, CreateJob, JobQueue, JobRepository, JobStatus, LibraryRepository};
use folio_server::extraction::{CancelToken, WarningCode};
use folio_server::storage::BlobStore;

#[tokio::test]
async fn test_epub_ingestion_persists_chapters_assets_and_cover() {
    let h = harness().await;
    let job = h.enqueue("voyage.epub", &three_chapter_epub(), JobQueue::User).await;

    let report = h.worker.run_once(&CancelToken::new()).await.unwrap().unwrap();
    assert_eq!(report.job_id, job.id);
    assert_eq!(report.status, JobStatus::Succeeded, "error: {:?}", report.error);
    assert_eq!(report.units_count, 3);

    let stored = h.job(&job.id).await;
    assert_eq!(stored.status(), Some(JobStatus::Succeeded));
    assert_eq!(stored.source_format.as_deref(), Some("epub"));
    assert_eq!(stored.units_count, Some(3));
    assert_eq!(stored.text_source.as_deref(), Some("NativeText"));
    assert!(stored.error.is_none());
    assert!(stored.finished_at.is_some());

    let library = LibraryRepository::new(&h.pool);
    let edition = library.get_edition(&job.edition_id).await.unwrap().unwrap();
    assert_eq!(edition.title.as_deref(), Some("The Test Voyage"));
    assert_eq!(edition.authors(), vec!["Ann Writer"]);
    assert_eq!(edition.language.as_deref(), Some("en"));
    assert_eq!(edition.chapter_count, 3);
    assert!(!edition.is_published);

    let cover_path = edition.cover_path.expect("cover stored");
    assert_eq!(h.store.get(&cover_path).await.unwrap(), COVER);

    let chapters = library.list_chapters(&job.edition_id).await.unwrap();
    let numbers: Vec<i64> = chapters.iter().map(|c| c.chapter_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    let slugs: Vec<&str> = chapters.iter().map(|c| c.slug.as_str()).collect();
    assert_eq!(slugs, vec!["departure", "the-storm", "landfall"]);
    assert!(chapters.iter().all(|c| c.word_count > 0));

    let assets = library.list_assets(&job.edition_id).await.unwrap();
    assert_eq!(assets.len(), 1);
    let asset = &assets[0];
    assert_eq!(asset.mime_type, "image/png");
    assert_eq!(h.store.get(&asset.storage_key).await.unwrap(), PNG);

    let storm = &chapters[1];
    let expected = format!("/books/{}/assets/{}", job.edition_id, asset.id);
    assert!(storm.html.contains(&expected), "html: {}", storm.html);
    assert!(!storm.html.contains("../images/pic.png"));

    assert_eq!(h.indexer.count(&job.edition_id).await.unwrap(), 3);
    let hits = h.indexer.search("harbour", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].edition_id, job.edition_id);
}

#[tokio::test]
async fn test_reingestion_replaces_previous_content() {
    let h = harness().await;
    let first = h.enqueue("voyage.epub", &three_chapter_epub(), JobQueue::User).await;
    h.worker.run_once(&CancelToken::new()).await.unwrap().unwrap();

    let shorter = build_epub(
        &[EpubChapter {
            title: "Only",
            body: "<h1>Only</h1><p>A single chapter remains in the revised edition.</p>",
        }],
        false,
    );
    let key = folio_server::storage::content_key("uploads", &shorter, "epub");
    h.store.put(&key, &shorter, "application/epub+zip").await.unwrap();
    let second = JobRepository::new(&h.pool)
        .create(&CreateJob {
            edition_id: first.edition_id.clone(),
            file_key: key,
            file_name: "voyage-2.epub".to_string(),
            queue: JobQueue::User,
        })
        .await
        .unwrap();

    let report = h.worker.run_once(&CancelToken::new()).await.unwrap().unwrap();
    assert_eq!(report.job_id, second.id);
    assert_eq!(report.status, JobStatus::Succeeded);

    let library = LibraryRepository::new(&h.pool);
    let chapters = library.list_chapters(&first.edition_id).await.unwrap();
    assert_eq!(chapters.len(), 1);
    assert_eq!(chapters[0].slug, "only");
    assert!(library.list_assets(&first.edition_id).await.unwrap().is_empty());
    assert_eq!(h.indexer.count(&first.edition_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_fb2_ingestion() {
    let h = harness().await;
    let job = h.enqueue("winter.fb2", FB2_BOOK.as_bytes(), JobQueue::Public).await;

    let report = h.worker.run_once(&CancelToken::new()).await.unwrap().unwrap();
    assert_eq!(report.status, JobStatus::Succeeded, "error: {:?}", report.error);
    assert_eq!(report.units_count, 2);

    let library = LibraryRepository::new(&h.pool);
    let edition = library.get_edition(&job.edition_id).await.unwrap().unwrap();
    assert_eq!(edition.title.as_deref(), Some("Winter Road"));
    assert_eq!(edition.authors(), vec!["Anna Petrova"]);
    assert_eq!(edition.source_format.as_deref(), Some("fb2"));

    let chapters = library.list_chapters(&job.edition_id).await.unwrap();
    assert_eq!(chapters[0].title, "First Snow");
    assert_eq!(chapters[1].slug, "thaw");

    let assets = library.list_assets(&job.edition_id).await.unwrap();
    assert_eq!(assets.len(), 1);
    assert!(chapters[0]
        .html
        .contains(&format!("/books/{}/assets/{}", job.edition_id, assets[0].id)));
}

#[tokio::test]
async fn test_pdf_without_text_layer_fails_with_no_text_layer() {
    let h = harness().await;
    let job = h.enqueue("scan.pdf", &blank_pdf(), JobQueue::User).await;

    let report = h.worker.run_once(&CancelToken::new()).await.unwrap().unwrap();
    assert_eq!(report.status, JobStatus::Failed);

    let stored = h.job(&job.id).await;
    assert_eq!(stored.status(), Some(JobStatus::Failed));
    let error = stored.error.clone().unwrap_or_default();
    assert!(error.starts_with("no_text_layer"), "error: {}", error);
    assert_eq!(stored.text_source.as_deref(), Some("None"));
    assert!(stored.warnings().iter().any(|w| w.code == WarningCode::NoTextLayer));

    let library = LibraryRepository::new(&h.pool);
    assert!(library.list_chapters(&job.edition_id).await.unwrap().is_empty());
    assert_eq!(h.indexer.count(&job.edition_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_scanned_djvu_uses_ocr() {
    let mut config = test_config();
    config.extraction.ocr_enabled = true;
    let h = harness_with(
        config,
        ocr_service(vec![Arc::new(PageNumberOcr)]),
        Arc::new(ScannedDjvu { pages: 2 }),
    )
    .await;
    let job = h.enqueue("scan.djvu", b"AT&TFORM\0\0\0\0DJVM", JobQueue::User).await;

    let report = h.worker.run_once(&CancelToken::new()).await.unwrap().unwrap();
    assert_eq!(report.status, JobStatus::Succeeded, "error: {:?}", report.error);
    assert_eq!(report.units_count, 2);

    let stored = h.job(&job.id).await;
    assert_eq!(stored.text_source.as_deref(), Some("Ocr"));
    let confidence = stored.confidence.expect("confidence recorded");
    assert!((confidence - 0.9).abs() < 1e-9);

    let chapters = LibraryRepository::new(&h.pool).list_chapters(&job.edition_id).await.unwrap();
    assert!(chapters[1].plain_text.contains("page number 2"));
}

#[tokio::test]
async fn test_unsupported_file_fails_job() {
    let h = harness().await;
    let job = h.enqueue("notes.txt", b"just text", JobQueue::User).await;

    let report = h.worker.run_once(&CancelToken::new()).await.unwrap().unwrap();
    assert_eq!(report.status, JobStatus::Failed);
    let error = h.job(&job.id).await.error.unwrap_or_default();
    assert!(error.starts_with("unsupported"), "error: {}", error);
}

#[tokio::test]
async fn test_missing_blob_fails_with_storage_error() {
    let h = harness().await;
    let edition = LibraryRepository::new(&h.pool)
        .create_edition(&CreateEdition {
            id: None,
            source_key: "uploads/missing.epub".to_string(),
            source_file_name: "missing.epub".to_string(),
        })
        .await
        .unwrap();
    let job = JobRepository::new(&h.pool)
        .create(&CreateJob {
            edition_id: edition.id,
            file_key: "uploads/missing.epub".to_string(),
            file_name: "missing.epub".to_string(),
            queue: JobQueue::User,
        })
        .await
        .unwrap();

    h.worker.run_once(&CancelToken::new()).await.unwrap().unwrap();
    let error = h.job(&job.id).await.error.unwrap_or_default();
    assert!(error.starts_with("storage_error"), "error: {}", error);
}

#[tokio::test]
async fn test_cancelled_job_reaches_terminal_state() {
    let h = harness().await;
    h.enqueue("voyage.epub", &three_chapter_epub(), JobQueue::User).await;
    let job = JobRepository::new(&h.pool)
        .claim_next(h.worker.worker_id())
        .await
        .unwrap()
        .unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let report = h.worker.process(&job, &cancel).await;

    assert_eq!(report.status, JobStatus::Failed);
    let stored = h.job(&job.id).await;
    assert!(stored.status().is_some_and(|s| s.is_terminal()));
    assert!(stored.error.unwrap_or_default().starts_with("cancelled"));
    assert!(LibraryRepository::new(&h.pool).list_chapters(&job.edition_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_worker_does_not_claim_after_shutdown() {
    let h = harness().await;
    let job = h.enqueue("voyage.epub", &three_chapter_epub(), JobQueue::User).await;

    let shutdown = CancelToken::new();
    shutdown.cancel();
    assert!(h.worker.run_once(&shutdown).await.unwrap().is_none());
    assert_eq!(h.job(&job.id).await.status(), Some(JobStatus::Queued));
}

#[tokio::test]
async fn test_idle_worker_returns_none() {
    let h = harness().await;
    assert!(h.worker.run_once(&CancelToken::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_job_can_be_retried_and_succeed() {
    let h = harness().await;
    let job = h.enqueue("voyage.epub", &three_chapter_epub(), JobQueue::User).await;
    let jobs = JobRepository::new(&h.pool);

    // Succeeded jobs are not retryable
    h.worker.run_once(&CancelToken::new()).await.unwrap().unwrap();
    assert!(!jobs.retry(&job.id).await.unwrap());

    let broken = h.enqueue("broken.epub", b"PK not really a zip", JobQueue::User).await;
    let report = h.worker.run_once(&CancelToken::new()).await.unwrap().unwrap();
    assert_eq!(report.status, JobStatus::Failed);

    assert!(jobs.retry(&broken.id).await.unwrap());
    let queued = h.job(&broken.id).await;
    assert_eq!(queued.status(), Some(JobStatus::Queued));
    assert!(queued.error.is_none());

    let report = h.worker.run_once(&CancelToken::new()).await.unwrap().unwrap();
    assert_eq!(report.job_id, broken.id);
    assert_eq!(h.job(&broken.id).await.attempt_count, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_are_exclusive() {
    let dir = tempfile::TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("jobs.db").display());
    let pool = db::create_pool(&url).await.unwrap();

    let library = LibraryRepository::new(&pool);
    let jobs = JobRepository::new(&pool);
    let mut created = HashSet::new();
    for i in 0..3 {
        let edition = library
            .create_edition(&CreateEdition {
                id: None,
                source_key: format!("uploads/{}.epub", i),
                source_file_name: format!("{}.epub", i),
            })
            .await
            .unwrap();
        let job = jobs
            .create(&CreateJob {
                edition_id: edition.id,
                file_key: format!("uploads/{}.epub", i),
                file_name: format!("{}.epub", i),
                queue: JobQueue::User,
            })
            .await
            .unwrap();
        created.insert(job.id);
    }

    let mut handles = Vec::new();
    for w in 0..8 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let worker_id = format!("worker-{}", w);
            let mut claimed = Vec::new();
            loop {
                match JobRepository::new(&pool).claim_next(&worker_id).await {
                    Ok(Some(job)) => {
                        assert_eq!(job.worker_id.as_deref(), Some(worker_id.as_str()));
                        claimed.push(job.id);
                    }
                    Ok(None) => break,
                    // Lost a write race on the database lock; poll again like the worker does
                    Err(_) => tokio::task::yield_now().await,
                }
            }
            claimed
        }));
    }

    let mut claimed = Vec::new();
    for handle in handles {
        claimed.extend(handle.await.unwrap());
    }
    assert_eq!(claimed.len(), 3);
    assert_eq!(claimed.into_iter().collect::<HashSet<_>>(), created);
}
