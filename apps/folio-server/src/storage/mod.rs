//! Blob storage
//!
//! Uploaded source files, extracted images and covers live in a blob
//! store addressed by string keys. Two backends:
//! - `LocalBlobStore`: a directory tree
//! - `S3BlobStore`: any S3-compatible service (MinIO, R2, B2, AWS)
//!
//! Asset keys are content-addressed, so rewriting the same bytes is a no-op.

mod local;
mod s3;

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::config::StorageConfig;
use crate::error::StorageError;

pub use local::LocalBlobStore;
pub use s3::S3BlobStore;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> StorageResult<()>;

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Build the configured backend
pub async fn open(config: &StorageConfig) -> StorageResult<Arc<dyn BlobStore>> {
    match config {
        StorageConfig::Local { root } => Ok(Arc::new(LocalBlobStore::new(root.clone()).await?)),
        StorageConfig::S3(s3) => Ok(Arc::new(S3BlobStore::new(s3).await?)),
    }
}

/// `{prefix}/{sha256}.{ext}`
pub fn content_key(prefix: &str, data: &[u8], extension: &str) -> String {
    let digest = hex::encode(Sha256::digest(data));
    let prefix = prefix.trim_end_matches('/');
    if extension.is_empty() {
        format!("{}/{}", prefix, digest)
    } else {
        format!("{}/{}.{}", prefix, digest, extension.trim_start_matches('.'))
    }
}

/// Reject keys that could escape the store root
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.contains('\0')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_key_is_stable() {
        let a = content_key("editions/e1/assets", b"bytes", "png");
        let b = content_key("editions/e1/assets/", b"bytes", ".png");
        assert_eq!(a, b);
        assert!(a.starts_with("editions/e1/assets/"));
        assert!(a.ends_with(".png"));
        assert_ne!(a, content_key("editions/e1/assets", b"other", "png"));
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("uploads/a/book.epub").is_ok());
        for bad in ["", "/abs", "a/../b", "a//b", "a\\b", "./a"] {
            assert!(validate_key(bad).is_err(), "{bad}");
        }
    }
}
