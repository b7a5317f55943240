//! FTS5 full-text index for chapters
//!
//! Documents live in a standalone FTS5 table keyed by chapter id. Re-indexing
//! an edition deletes its previous rows in the same transaction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::{SearchDocument, SearchError, SearchIndexer};

/// FTS5 search result
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub chapter_id: String,
    pub edition_id: String,
    pub title: String,
    /// Content excerpt with `<mark>` around matches
    pub snippet: String,
    /// FTS5 rank score (lower = better match)
    pub rank: f64,
}

/// SQLite FTS5 indexer
pub struct FtsIndexer {
    pool: SqlitePool,
}

impl FtsIndexer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the FTS5 virtual table
    pub async fn initialize(&self) -> Result<(), SearchError> {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS chapter_search USING fts5(
                chapter_id UNINDEXED,
                edition_id UNINDEXED,
                site UNINDEXED,
                language UNINDEXED,
                metadata UNINDEXED,
                title,
                content,
                tokenize='unicode61 remove_diacritics 2'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Search chapter titles and text
    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<SearchHit>, SearchError> {
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }

        let hits = sqlx::query_as::<_, SearchHit>(
            r#"
            SELECT
                chapter_id,
                edition_id,
                title,
                snippet(chapter_search, 6, '<mark>', '</mark>', '…', 16) AS snippet,
                rank
            FROM chapter_search
            WHERE chapter_search MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(&sanitized)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(hits)
    }

    /// Number of indexed chapters of an edition
    pub async fn count(&self, edition_id: &str) -> Result<i64, SearchError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chapter_search WHERE edition_id = ?")
            .bind(edition_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl SearchIndexer for FtsIndexer {
    fn name(&self) -> &'static str {
        "fts"
    }

    async fn index_edition(&self, edition_id: &str, documents: &[SearchDocument]) -> Result<(), SearchError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chapter_search WHERE edition_id = ?")
            .bind(edition_id)
            .execute(&mut *tx)
            .await?;

        for doc in documents {
            let metadata = serde_json::to_string(&doc.metadata).unwrap_or_else(|_| "{}".to_string());
            sqlx::query(
                r#"
                INSERT INTO chapter_search (chapter_id, edition_id, site, language, metadata, title, content)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&doc.id)
            .bind(edition_id)
            .bind(&doc.site)
            .bind(&doc.language)
            .bind(metadata)
            .bind(&doc.title)
            .bind(&doc.content)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(edition_id, documents = documents.len(), "Indexed chapters");
        Ok(())
    }
}

/// Sanitize a query string for FTS5
///
/// Operator characters are dropped, double quotes doubled, and multi-word
/// input becomes a phrase query.
pub fn sanitize_fts5_query(query: &str) -> String {
    let mut result = String::with_capacity(query.len());

    for ch in query.chars() {
        match ch {
            '"' => result.push_str("\"\""),
            '*' | '(' | ')' | ':' | '^' | '-' | '+' => {}
            _ => result.push(ch),
        }
    }

    let trimmed = result.split_whitespace().collect::<Vec<_>>().join(" ");
    if trimmed.contains(' ') || trimmed.contains('"') {
        format!("\"{}\"", trimmed)
    } else {
        trimmed
    }
}
