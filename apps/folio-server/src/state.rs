//! Shared handler state

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::storage::BlobStore;

/// Handles shared by every route; cheap to clone
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Shared>,
}

struct Shared {
    store: Arc<dyn BlobStore>,
    db: SqlitePool,
}

impl AppState {
    pub fn new(store: Arc<dyn BlobStore>, db: SqlitePool) -> Self {
        Self {
            inner: Arc::new(Shared { store, db }),
        }
    }

    pub fn store(&self) -> &dyn BlobStore {
        self.inner.store.as_ref()
    }

    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }
}
