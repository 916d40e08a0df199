//! Blob storage seam for exported files.

mod http;
mod local;

pub use http::HttpBlobStore;
pub use local::LocalBlobStore;

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{StorageBackend, StorageSettings};

pub const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("bucket {bucket}: {reason}")]
    Bucket { bucket: String, reason: String },
    #[error("invalid object key {0:?}")]
    InvalidKey(String),
    #[error("local I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage request failed: {0}")]
    Http(String),
    #[error("storage rejected {key} with HTTP {status}")]
    Rejected { key: String, status: u16 },
}

/// Bucket/key blob store. `put_file` returns only once the store has
/// confirmed the object is written.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create the bucket if it does not exist. Idempotent.
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), UploadError>;

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), UploadError>;
}

pub fn build_blob_store(settings: &StorageSettings) -> anyhow::Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match settings.backend {
        StorageBackend::Local => Arc::new(LocalBlobStore::new(&settings.root)),
        StorageBackend::Http => Arc::new(HttpBlobStore::new(&settings.endpoint)?),
    };
    Ok(store)
}

/// Reject keys that could escape a bucket when mapped onto a filesystem.
pub(crate) fn validate_key(key: &str) -> Result<(), UploadError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.ends_with('/')
        || key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad {
        return Err(UploadError::InvalidKey(key.to_string()));
    }
    Ok(())
}
