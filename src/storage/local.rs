use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt};

use super::{validate_key, BlobStore, UploadError};

/// Filesystem-backed store: each bucket is a directory under `root` and
/// keys map to relative paths inside it.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), UploadError> {
        validate_key(bucket)?;
        fs::create_dir_all(self.root.join(bucket))
            .await
            .map_err(|err| UploadError::Bucket {
                bucket: bucket.to_string(),
                reason: err.to_string(),
            })
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        _content_type: &str,
    ) -> Result<(), UploadError> {
        validate_key(key)?;
        let bucket_dir = self.root.join(bucket);
        if !fs::try_exists(&bucket_dir).await? {
            return Err(UploadError::Bucket {
                bucket: bucket.to_string(),
                reason: "does not exist".into(),
            });
        }

        let destination = self.object_path(bucket, key);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Copy to a sibling temp file, fsync, then rename into place so a
        // visible object is always complete.
        let staging = destination.with_extension("upload.tmp");
        let contents = fs::read(path).await?;
        let mut file = fs::File::create(&staging).await?;
        file.write_all(&contents).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&staging, &destination).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_requires_bucket_then_lands_at_key() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("batch.parquet");
        std::fs::write(&source, b"PAR1 fake").unwrap();

        let store = LocalBlobStore::new(dir.path().join("objects"));
        let key = "traffic/parquet/2025-03-01/batch.parquet";

        assert!(matches!(
            store.put_file("raw-traffic-data", key, &source, "x").await,
            Err(UploadError::Bucket { .. })
        ));

        store.ensure_bucket("raw-traffic-data").await.unwrap();
        store.ensure_bucket("raw-traffic-data").await.unwrap();
        store.put_file("raw-traffic-data", key, &source, "x").await.unwrap();

        let landed = store.object_path("raw-traffic-data", key);
        assert_eq!(std::fs::read(landed).unwrap(), b"PAR1 fake");
    }

    #[tokio::test]
    async fn missing_source_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        store.ensure_bucket("b").await.unwrap();
        let result = store
            .put_file("b", "k.parquet", &dir.path().join("missing.parquet"), "x")
            .await;
        assert!(matches!(result, Err(UploadError::Io(_))));
    }
}
