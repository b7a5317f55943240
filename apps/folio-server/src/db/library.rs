//! Editions, chapters and book assets

use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::now;
use crate::error::{AppError, Result};
use crate::extraction::{SourceFormat, UnitType};

/// Edition record
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Edition {
    pub id: String,
    pub title: Option<String>,
    /// JSON array of names
    #[serde(skip)]
    pub authors: String,
    pub language: Option<String>,
    pub description: Option<String>,
    pub source_format: Option<String>,
    pub source_key: Option<String>,
    pub source_file_name: Option<String>,
    pub cover_path: Option<String>,
    pub chapter_count: i64,
    pub is_published: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Edition {
    pub fn authors(&self) -> Vec<String> {
        serde_json::from_str(&self.authors).unwrap_or_default()
    }
}

/// Create or re-point an edition at an uploaded source file
#[derive(Debug, Clone)]
pub struct CreateEdition {
    pub id: Option<String>,
    pub source_key: String,
    pub source_file_name: String,
}

/// Chapter record
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub edition_id: String,
    pub chapter_number: i64,
    pub slug: String,
    pub title: String,
    pub html: String,
    pub plain_text: String,
    pub word_count: i64,
    pub unit_type: String,
    pub original_chapter_number: Option<i64>,
    pub part_number: Option<i64>,
    pub total_parts: Option<i64>,
    pub created_at: String,
}

/// Book asset record
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BookAsset {
    pub id: String,
    pub edition_id: String,
    pub original_path: String,
    pub storage_key: String,
    pub mime_type: String,
    pub size: i64,
    pub created_at: String,
}

/// Asset row to insert; the blob is already stored under `storage_key`
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub id: String,
    pub original_path: String,
    pub storage_key: String,
    pub mime_type: String,
    pub size: i64,
}

/// Chapter row to insert
#[derive(Debug, Clone)]
pub struct NewChapter {
    pub id: String,
    pub chapter_number: i64,
    pub slug: String,
    pub title: String,
    pub html: String,
    pub plain_text: String,
    pub word_count: i64,
    pub unit_type: UnitType,
    pub original_chapter_number: Option<i64>,
    pub part_number: Option<i64>,
    pub total_parts: Option<i64>,
}

/// Everything one successful ingestion writes for an edition
#[derive(Debug, Clone)]
pub struct EditionContent {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub source_format: SourceFormat,
    pub cover_path: Option<String>,
    pub assets: Vec<NewAsset>,
    pub chapters: Vec<NewChapter>,
}

fn unit_type_str(unit_type: UnitType) -> &'static str {
    match unit_type {
        UnitType::Chapter => "chapter",
        UnitType::Page => "page",
    }
}

/// Library repository
pub struct LibraryRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> LibraryRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an edition, or re-point an existing one at a new upload
    pub async fn create_edition(&self, edition: &CreateEdition) -> Result<Edition> {
        let id = edition.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = now();

        sqlx::query(
            r#"
            INSERT INTO editions (id, source_key, source_file_name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source_key = excluded.source_key,
                source_file_name = excluded.source_file_name,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id)
        .bind(&edition.source_key)
        .bind(&edition.source_file_name)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get_edition(&id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to create edition".to_string()))
    }

    /// Get a specific edition
    pub async fn get_edition(&self, id: &str) -> Result<Option<Edition>> {
        let edition = sqlx::query_as::<_, Edition>(
            r#"
            SELECT id, title, authors, language, description, source_format, source_key,
                   source_file_name, cover_path, chapter_count, is_published, created_at, updated_at
            FROM editions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(edition)
    }

    /// Replace the extracted content of an edition in one transaction
    ///
    /// Previous chapters and assets are deleted first, so running the same
    /// ingestion twice leaves the same rows behind. Metadata the extractor
    /// did not find keeps its previous value.
    pub async fn persist(&self, edition_id: &str, content: &EditionContent) -> Result<()> {
        let now = now();
        let authors = serde_json::to_string(&content.authors).unwrap_or_else(|_| "[]".to_string());
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chapters WHERE edition_id = ?")
            .bind(edition_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM book_assets WHERE edition_id = ?")
            .bind(edition_id)
            .execute(&mut *tx)
            .await?;

        for asset in &content.assets {
            sqlx::query(
                r#"
                INSERT INTO book_assets (id, edition_id, original_path, storage_key, mime_type, size, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&asset.id)
            .bind(edition_id)
            .bind(&asset.original_path)
            .bind(&asset.storage_key)
            .bind(&asset.mime_type)
            .bind(asset.size)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        let updated = sqlx::query(
            r#"
            UPDATE editions
            SET title = COALESCE(?, title),
                authors = CASE WHEN ? = '[]' THEN authors ELSE ? END,
                language = COALESCE(?, language),
                description = COALESCE(?, description),
                source_format = ?,
                cover_path = COALESCE(?, cover_path),
                chapter_count = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&content.title)
        .bind(&authors)
        .bind(&authors)
        .bind(&content.language)
        .bind(&content.description)
        .bind(content.source_format.as_str())
        .bind(&content.cover_path)
        .bind(content.chapters.len() as i64)
        .bind(&now)
        .bind(edition_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Edition {}", edition_id)));
        }

        for chapter in &content.chapters {
            sqlx::query(
                r#"
                INSERT INTO chapters (id, edition_id, chapter_number, slug, title, html, plain_text,
                                      word_count, unit_type, original_chapter_number, part_number,
                                      total_parts, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chapter.id)
            .bind(edition_id)
            .bind(chapter.chapter_number)
            .bind(&chapter.slug)
            .bind(&chapter.title)
            .bind(&chapter.html)
            .bind(&chapter.plain_text)
            .bind(chapter.word_count)
            .bind(unit_type_str(chapter.unit_type))
            .bind(chapter.original_chapter_number)
            .bind(chapter.part_number)
            .bind(chapter.total_parts)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            edition_id,
            chapters = content.chapters.len(),
            assets = content.assets.len(),
            "Persisted edition content"
        );
        Ok(())
    }

    /// Chapters of an edition in reading order
    pub async fn list_chapters(&self, edition_id: &str) -> Result<Vec<Chapter>> {
        let chapters = sqlx::query_as::<_, Chapter>(
            r#"
            SELECT id, edition_id, chapter_number, slug, title, html, plain_text, word_count,
                   unit_type, original_chapter_number, part_number, total_parts, created_at
            FROM chapters
            WHERE edition_id = ?
            ORDER BY chapter_number
            "#,
        )
        .bind(edition_id)
        .fetch_all(self.pool)
        .await?;

        Ok(chapters)
    }

    /// Get one asset of an edition
    pub async fn get_asset(&self, edition_id: &str, asset_id: &str) -> Result<Option<BookAsset>> {
        let asset = sqlx::query_as::<_, BookAsset>(
            r#"
            SELECT id, edition_id, original_path, storage_key, mime_type, size, created_at
            FROM book_assets
            WHERE edition_id = ? AND id = ?
            "#,
        )
        .bind(edition_id)
        .bind(asset_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(asset)
    }

    /// Assets of an edition
    pub async fn list_assets(&self, edition_id: &str) -> Result<Vec<BookAsset>> {
        let assets = sqlx::query_as::<_, BookAsset>(
            r#"
            SELECT id, edition_id, original_path, storage_key, mime_type, size, created_at
            FROM book_assets
            WHERE edition_id = ?
            ORDER BY original_path
            "#,
        )
        .bind(edition_id)
        .fetch_all(self.pool)
        .await?;

        Ok(assets)
    }
}
