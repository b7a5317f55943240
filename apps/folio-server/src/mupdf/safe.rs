//! Thread-safe document wrapper for MuPDF
//!
//! 1. Stores the document bytes
//! 2. Opens a fresh document for each operation
//! 3. Uses `parking_lot::Mutex` to serialize access
//!
//! No `mupdf::Document` outlives the closure it was opened for.

use std::sync::Arc;

use mupdf::{Document, Page};
use parking_lot::Mutex;

const PDF_MIME: &str = "application/pdf";

/// MuPDF errors
#[derive(Debug, thiserror::Error)]
pub enum MupdfError {
    #[error("MuPDF error: {0}")]
    Context(String),

    #[error("Page {0} out of range")]
    PageOutOfRange(usize),

    #[error("Image error: {0}")]
    Image(String),
}

impl From<mupdf::Error> for MupdfError {
    fn from(err: mupdf::Error) -> Self {
        MupdfError::Context(err.to_string())
    }
}

/// Serialized access to one PDF held in memory
pub struct SafeDocument {
    data: Arc<Vec<u8>>,
    /// Cached page count
    page_count: usize,
    lock: Mutex<()>,
}

impl SafeDocument {
    /// Open the document once to validate it and count pages
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, MupdfError> {
        let doc = Document::from_bytes(&data, PDF_MIME)?;
        let page_count = doc.page_count()?.max(0) as usize;

        Ok(Self {
            data: Arc::new(data),
            page_count,
            lock: Mutex::new(()),
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Execute a closure with access to a freshly opened document
    pub fn with_doc<F, R>(&self, f: F) -> Result<R, MupdfError>
    where
        F: FnOnce(&Document) -> Result<R, MupdfError>,
    {
        let _guard = self.lock.lock();
        let doc = Document::from_bytes(&self.data, PDF_MIME)?;
        f(&doc)
    }

    /// Execute a closure with one loaded page (0-based)
    pub fn with_page<F, R>(&self, index: usize, f: F) -> Result<R, MupdfError>
    where
        F: FnOnce(&Page) -> Result<R, MupdfError>,
    {
        if index >= self.page_count {
            return Err(MupdfError::PageOutOfRange(index));
        }
        self.with_doc(|doc| {
            let page = doc.load_page(index as i32)?;
            f(&page)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_is_rejected() {
        assert!(SafeDocument::from_bytes(b"not a pdf at all".to_vec()).is_err());
    }
}
