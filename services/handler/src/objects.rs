//! Object-store metadata reads.
//!
//! The enrollment path needs exactly one thing from the object store: the
//! user-defined metadata attached to an uploaded image.

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Errors raised while reading object metadata.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("object store request failed: {0}")]
    Service(String),
}

impl ObjectStoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Service(_))
    }
}

/// Read-side interface to the object store.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectDirectory: Send + Sync {
    /// User-defined metadata attached to a stored object. May be empty.
    async fn metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<HashMap<String, String>, ObjectStoreError>;
}

/// S3-backed [`ObjectDirectory`].
pub struct S3ObjectDirectory {
    client: S3Client,
}

impl S3ObjectDirectory {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectDirectory for S3ObjectDirectory {
    async fn metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<HashMap<String, String>, ObjectStoreError> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    ObjectStoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    ObjectStoreError::Service(err.to_string())
                }
            })?;

        let metadata = response.metadata().cloned().unwrap_or_default();

        debug!(
            bucket = %bucket,
            key = %key,
            fields = metadata.len(),
            "Read object metadata"
        );

        Ok(metadata)
    }
}
