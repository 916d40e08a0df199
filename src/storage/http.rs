use std::{path::Path, time::Duration};

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client as HttpClient, StatusCode};

use super::{validate_key, BlobStore, UploadError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// S3-compatible store using path-style URLs (`{endpoint}/{bucket}/{key}`).
/// Requests are unsigned, so the endpoint must accept anonymous writes for
/// the bucket (e.g. a MinIO bucket with a public write policy).
pub struct HttpBlobStore {
    http: HttpClient,
    endpoint: String,
}

impl HttpBlobStore {
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        let http = HttpClient::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/{}", self.endpoint, bucket)
    }
}

fn transport(err: reqwest::Error) -> UploadError {
    UploadError::Http(err.to_string())
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), UploadError> {
        validate_key(bucket)?;
        let url = self.bucket_url(bucket);

        let head = self.http.head(&url).send().await.map_err(transport)?;
        if head.status().is_success() {
            return Ok(());
        }
        if head.status() != StatusCode::NOT_FOUND {
            return Err(UploadError::Bucket {
                bucket: bucket.to_string(),
                reason: format!("HEAD returned HTTP {}", head.status().as_u16()),
            });
        }

        let created = self.http.put(&url).send().await.map_err(transport)?;
        // 409 means someone created it between our HEAD and PUT.
        if created.status().is_success() || created.status() == StatusCode::CONFLICT {
            Ok(())
        } else {
            Err(UploadError::Bucket {
                bucket: bucket.to_string(),
                reason: format!("create returned HTTP {}", created.status().as_u16()),
            })
        }
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), UploadError> {
        validate_key(key)?;
        let body = tokio::fs::read(path).await?;
        let url = format!("{}/{}", self.bucket_url(bucket), key);

        let response = self
            .http
            .put(&url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(transport)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(UploadError::Rejected {
                key: key.to_string(),
                status: response.status().as_u16(),
            })
        }
    }
}
