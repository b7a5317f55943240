//! Search indexing
//!
//! The worker pushes one document per persisted chapter to a
//! `SearchIndexer`. The index itself belongs to another service; this
//! module only knows how to hand documents over:
//! - `FtsIndexer`: SQLite FTS5 tables next to the library data
//! - `HttpIndexer`: batch POST to an external search service
//! - `NoopIndexer`: indexing disabled

mod fts;
mod http;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::{SearchBackend, SearchConfig};

pub use fts::{sanitize_fts5_query, FtsIndexer, SearchHit};
pub use http::HttpIndexer;

/// Errors while submitting documents
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Index database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Search service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search service rejected batch ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// One indexable chapter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    /// Chapter id
    pub id: String,
    pub title: String,
    /// Plain text
    pub content: String,
    pub language: Option<String>,
    pub site: String,
    /// Chapter and edition ids, slugs, authors, cover path
    pub metadata: BTreeMap<String, String>,
}

#[async_trait]
pub trait SearchIndexer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Replace every document of an edition with `documents`
    async fn index_edition(&self, edition_id: &str, documents: &[SearchDocument]) -> Result<(), SearchError>;
}

/// Indexer used when search is disabled
pub struct NoopIndexer;

#[async_trait]
impl SearchIndexer for NoopIndexer {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn index_edition(&self, edition_id: &str, documents: &[SearchDocument]) -> Result<(), SearchError> {
        tracing::debug!(edition_id, documents = documents.len(), "Search indexing disabled");
        Ok(())
    }
}

/// Build the configured indexer
pub async fn open(config: &SearchConfig, pool: &SqlitePool) -> Result<Arc<dyn SearchIndexer>, SearchError> {
    let indexer: Arc<dyn SearchIndexer> = match &config.backend {
        SearchBackend::Fts => {
            let fts = FtsIndexer::new(pool.clone());
            fts.initialize().await?;
            Arc::new(fts)
        }
        SearchBackend::Http { url } => Arc::new(HttpIndexer::new(url.clone())),
        SearchBackend::None => Arc::new(NoopIndexer),
    };
    tracing::info!(backend = indexer.name(), "Search indexer ready");
    Ok(indexer)
}
