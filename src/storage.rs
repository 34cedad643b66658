use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("duplicate")]
    Duplicate,
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Externally addressed file storage keyed by upload path.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn save(&self, key: &str, mime: &str, bytes: &[u8]) -> Result<(), BlobStoreError>;
    async fn load(&self, key: &str) -> Result<(Vec<u8>, String), BlobStoreError>;
    /// Removing a key that does not exist is not an error.
    async fn delete(&self, key: &str) -> Result<(), BlobStoreError>;
}

/// `thread_resources/YYYY/MM/DD/<uuid>-<name>` with the name reduced to a safe charset.
pub fn upload_key(filename: &str, now: DateTime<Utc>) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let mut safe: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .take(100)
        .collect();
    if safe.trim_matches(['.', '_']).is_empty() {
        safe = "file".into();
    }
    format!("thread_resources/{}/{}-{}", now.format("%Y/%m/%d"), uuid::Uuid::new_v4(), safe)
}

// ---------------- S3 Implementation (MinIO compatible) ----------------
pub struct S3BlobStore {
    bucket: String,
    client: aws_sdk_s3::Client,
}

impl S3BlobStore {
    pub async fn new() -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let bucket = std::env::var("S3_BUCKET").unwrap_or_else(|_| "forum-resources".into());
        let endpoint = std::env::var("S3_ENDPOINT")
            .map_err(|_| anyhow::anyhow!("S3_ENDPOINT must be set (MinIO / S3 endpoint)"))?;
        let region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into());
        let access = std::env::var("S3_ACCESS_KEY").unwrap_or_default();
        let secret = std::env::var("S3_SECRET_KEY").unwrap_or_default();

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region));
        loader = loader.endpoint_url(endpoint);
        if !access.is_empty() && !secret.is_empty() {
            let creds = Credentials::new(access, secret, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // path-style addressing for MinIO/local endpoints without wildcard DNS
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(true)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("Initialized S3/MinIO client (path-style addressing enabled)");

        if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
            warn!("head_bucket failed for '{bucket}' (will attempt create): {e:?}");
            let mut attempt = 0u32;
            let max_attempts = 8;
            loop {
                attempt += 1;
                match client.create_bucket().bucket(&bucket).send().await {
                    Ok(_) => {
                        info!("created bucket '{bucket}' (attempt {attempt})");
                        break;
                    }
                    Err(e2) if attempt >= max_attempts => {
                        error!("create_bucket failed for '{bucket}' after {attempt} attempts: {e2:?}");
                        return Err(anyhow::anyhow!("failed to ensure bucket '{bucket}': {e2}"));
                    }
                    Err(e2) => {
                        let backoff_ms = 200 * attempt.pow(2); // quadratic backoff
                        warn!("create_bucket attempt {attempt} failed for '{bucket}': {e2:?} (retrying in {backoff_ms}ms)");
                        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms as u64)).await;
                    }
                }
            }
        }

        Ok(Self { bucket, client })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn save(&self, key: &str, mime: &str, bytes: &[u8]) -> Result<(), BlobStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        if self.client.head_object().bucket(&self.bucket).key(key).send().await.is_ok() {
            return Err(BlobStoreError::Duplicate);
        }
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(mime);
        if let Err(e) = put.send().await {
            error!("put_object failed key={key} bucket={} err={:?}", self.bucket, e);
            let hint = if e.to_string().contains("NoSuchBucket") {
                " (bucket missing or not yet propagated)"
            } else if e.to_string().contains("AccessDenied") {
                " (check S3_ACCESS_KEY/S3_SECRET_KEY permissions)"
            } else {
                ""
            };
            return Err(BlobStoreError::Other(format!("{e}{hint}")));
        }
        Ok(())
    }
    async fn load(&self, key: &str) -> Result<(Vec<u8>, String), BlobStoreError> {
        let obj = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|_| BlobStoreError::NotFound)?;
        let stored_mime = obj.content_type().map(str::to_string);
        let data = obj
            .body
            .collect()
            .await
            .map_err(|e| BlobStoreError::Other(e.to_string()))?;
        let bytes = Vec::from(data.into_bytes().as_ref());
        let mime = stored_mime
            .or_else(|| infer::get(&bytes).map(|t| t.mime_type().to_string()))
            .unwrap_or_else(|| "application/octet-stream".into());
        Ok((bytes, mime))
    }
    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        // S3 reports success for absent keys; any error here is real
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                error!("delete_object failed key={key} bucket={} err={:?}", self.bucket, e);
                BlobStoreError::Other(e.to_string())
            })?;
        Ok(())
    }
}

pub async fn build_blob_store() -> anyhow::Result<Arc<dyn BlobStore>> {
    Ok(Arc::new(S3BlobStore::new().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn upload_key_is_dated_and_sanitised() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let key = upload_key("../../etc/pass wd.pdf", now);
        assert!(key.starts_with("thread_resources/2024/03/09/"));
        assert!(key.ends_with("-pass_wd.pdf"));
        assert!(!key.contains(".."));
    }

    #[test]
    fn upload_key_falls_back_for_empty_names() {
        let now = Utc::now();
        assert!(upload_key("", now).ends_with("-file"));
        assert!(upload_key("...", now).ends_with("-file"));
    }
}
