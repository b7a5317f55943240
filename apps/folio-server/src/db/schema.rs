//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Editions (one uploaded book; unpublished until an ingestion succeeds)
CREATE TABLE IF NOT EXISTS editions (
    id TEXT PRIMARY KEY,
    title TEXT,
    authors TEXT NOT NULL DEFAULT '[]',
    language TEXT,
    description TEXT,
    source_format TEXT,
    source_key TEXT,
    source_file_name TEXT,
    cover_path TEXT,
    chapter_count INTEGER NOT NULL DEFAULT 0,
    is_published INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Chapters produced by extraction, in reading order
CREATE TABLE IF NOT EXISTS chapters (
    id TEXT PRIMARY KEY,
    edition_id TEXT NOT NULL REFERENCES editions(id) ON DELETE CASCADE,
    chapter_number INTEGER NOT NULL,
    slug TEXT NOT NULL,
    title TEXT NOT NULL,
    html TEXT NOT NULL,
    plain_text TEXT NOT NULL,
    word_count INTEGER NOT NULL DEFAULT 0,
    unit_type TEXT NOT NULL,
    original_chapter_number INTEGER,
    part_number INTEGER,
    total_parts INTEGER,
    created_at TEXT NOT NULL,
    UNIQUE(edition_id, slug),
    UNIQUE(edition_id, chapter_number)
);

CREATE INDEX IF NOT EXISTS idx_chapters_edition ON chapters(edition_id, chapter_number);

-- Inline images served at /books/{edition_id}/assets/{id}
CREATE TABLE IF NOT EXISTS book_assets (
    id TEXT PRIMARY KEY,
    edition_id TEXT NOT NULL REFERENCES editions(id) ON DELETE CASCADE,
    original_path TEXT NOT NULL,
    storage_key TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    size INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(edition_id, original_path)
);

CREATE INDEX IF NOT EXISTS idx_book_assets_edition ON book_assets(edition_id);

-- Ingestion jobs (Queued -> Processing -> Succeeded | Failed)
CREATE TABLE IF NOT EXISTS ingestion_jobs (
    id TEXT PRIMARY KEY,
    edition_id TEXT NOT NULL REFERENCES editions(id) ON DELETE CASCADE,
    file_key TEXT NOT NULL,
    file_name TEXT NOT NULL,
    queue TEXT NOT NULL DEFAULT 'user',
    status TEXT NOT NULL DEFAULT 'Queued',
    attempt_count INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    source_format TEXT,
    units_count INTEGER,
    text_source TEXT,
    confidence REAL,
    warnings TEXT NOT NULL DEFAULT '[]',
    worker_id TEXT,
    heartbeat_at TEXT,
    started_at TEXT,
    finished_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ingestion_jobs_claim ON ingestion_jobs(status, queue, created_at);
CREATE INDEX IF NOT EXISTS idx_ingestion_jobs_edition ON ingestion_jobs(edition_id);
"#;
