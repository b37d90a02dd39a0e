//! Enrollment image upload.
//!
//! The contract behind the operator's enrollment tool: put an image into
//! the enrollment bucket with an optional identity label attached as the
//! `fullname` metadata field. The enrollment handler falls back to the
//! object key when the label is absent.

use crate::uploader::UploadError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{info, instrument};

/// Metadata field the enrollment handler reads the identity label from.
pub const IDENTITY_METADATA_KEY: &str = "fullname";

/// Uploads enrollment images into the allowed-people bucket.
pub struct EnrollmentUploader {
    client: S3Client,
    bucket: String,
}

impl EnrollmentUploader {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Upload one enrollment image. The key is typically the image's file
    /// name; `fullname` becomes the identity label when present.
    #[instrument(skip(self, image_bytes), fields(bucket = %self.bucket, key = %key))]
    pub async fn upload(
        &self,
        key: &str,
        image_bytes: Vec<u8>,
        fullname: Option<&str>,
    ) -> Result<(), UploadError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(image_bytes))
            .content_type(content_type_for(key));

        if let Some(name) = fullname {
            request = request.metadata(IDENTITY_METADATA_KEY, name);
        }

        request
            .send()
            .await
            .map_err(|e| UploadError::Service(e.to_string()))?;

        info!(labeled = fullname.is_some(), "Enrollment image uploaded");
        Ok(())
    }
}

/// Content type from the file extension of the object key.
fn content_type_for(key: &str) -> &'static str {
    let extension = key.rsplit('.').next().unwrap_or_default();
    match extension.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}
