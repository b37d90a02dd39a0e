//! Face recognition collaborator.
//!
//! The handlers only ever do two things with the recognition service: index
//! an enrollment image into the allowed collection, and search the
//! collection for the best match to a monitored frame. Both are expressed
//! through [`FaceCatalog`] so tests can substitute a double.

use async_trait::async_trait;
use aws_sdk_rekognition::error::SdkError;
use aws_sdk_rekognition::operation::index_faces::IndexFacesError;
use aws_sdk_rekognition::operation::search_faces_by_image::SearchFacesByImageError;
use aws_sdk_rekognition::types::{Attribute, Image, S3Object};
use aws_sdk_rekognition::Client as RekognitionClient;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[cfg(test)]
use mockall::automock;

/// Errors raised by the face recognition collaborator.
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// No face was detectable in the query image. A normal outcome for the
    /// detection path, never an error the handler surfaces.
    #[error("no face detected in s3://{bucket}/{key}")]
    NoFaceDetected { bucket: String, key: String },

    #[error("face collection not found: {0}")]
    CollectionNotFound(String),

    #[error("image rejected for s3://{bucket}/{key}: {reason}")]
    InvalidImage {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("recognition service throttled: {0}")]
    Throttled(String),

    #[error("recognition request failed: {0}")]
    Service(String),
}

impl RecognitionError {
    /// Whether redelivering the triggering event could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Service(_))
    }
}

/// A face indexed into the allowed collection.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedFace {
    pub face_id: String,
    pub external_image_id: Option<String>,
    pub confidence: Option<f32>,
}

/// A candidate match returned by a collection search.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    pub face_id: String,
    /// Similarity score in [0, 100].
    pub similarity: f32,
}

/// Interface to the face recognition service.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FaceCatalog: Send + Sync {
    /// Detect and index every face in the referenced object into the allowed
    /// collection, tagging them with `external_id`. Returns the indexed
    /// faces; an image with no detectable face yields an empty list.
    async fn index_faces(
        &self,
        bucket: &str,
        key: &str,
        external_id: &str,
    ) -> Result<Vec<IndexedFace>, RecognitionError>;

    /// Search the allowed collection for the best match to the referenced
    /// frame, requesting at most one candidate at or above `min_similarity`.
    /// Results are ordered by descending similarity.
    async fn search_best_match(
        &self,
        bucket: &str,
        key: &str,
        min_similarity: f32,
    ) -> Result<Vec<FaceMatch>, RecognitionError>;
}

/// Rekognition-backed [`FaceCatalog`].
pub struct RekognitionCatalog {
    client: RekognitionClient,
    collection_id: String,
}

impl RekognitionCatalog {
    pub fn new(client: RekognitionClient, collection_id: impl Into<String>) -> Self {
        Self {
            client,
            collection_id: collection_id.into(),
        }
    }
}

#[async_trait]
impl FaceCatalog for RekognitionCatalog {
    #[instrument(skip(self), fields(collection = %self.collection_id))]
    async fn index_faces(
        &self,
        bucket: &str,
        key: &str,
        external_id: &str,
    ) -> Result<Vec<IndexedFace>, RecognitionError> {
        let response = self
            .client
            .index_faces()
            .collection_id(&self.collection_id)
            .image(s3_image(bucket, key))
            .external_image_id(external_id)
            .detection_attributes(Attribute::All)
            .send()
            .await
            .map_err(|e| map_index_error(e, &self.collection_id, bucket, key))?;

        let faces: Vec<IndexedFace> = response
            .face_records()
            .iter()
            .filter_map(|record| record.face())
            .filter_map(|face| {
                face.face_id().map(|id| IndexedFace {
                    face_id: id.to_string(),
                    external_image_id: face.external_image_id().map(str::to_string),
                    confidence: face.confidence(),
                })
            })
            .collect();

        info!(
            bucket = %bucket,
            key = %key,
            indexed = faces.len(),
            "Indexed faces into collection"
        );

        Ok(faces)
    }

    #[instrument(skip(self), fields(collection = %self.collection_id))]
    async fn search_best_match(
        &self,
        bucket: &str,
        key: &str,
        min_similarity: f32,
    ) -> Result<Vec<FaceMatch>, RecognitionError> {
        let response = self
            .client
            .search_faces_by_image()
            .collection_id(&self.collection_id)
            .image(s3_image(bucket, key))
            .max_faces(1)
            .face_match_threshold(min_similarity)
            .send()
            .await
            .map_err(|e| map_search_error(e, &self.collection_id, bucket, key))?;

        let matches: Vec<FaceMatch> = response
            .face_matches()
            .iter()
            .filter_map(|candidate| {
                let face_id = candidate.face().and_then(|f| f.face_id())?;
                Some(FaceMatch {
                    face_id: face_id.to_string(),
                    similarity: candidate.similarity().unwrap_or(0.0),
                })
            })
            .collect();

        debug!(
            bucket = %bucket,
            key = %key,
            matches = matches.len(),
            "Collection search completed"
        );

        Ok(matches)
    }
}

fn s3_image(bucket: &str, key: &str) -> Image {
    Image::builder()
        .s3_object(S3Object::builder().bucket(bucket).name(key).build())
        .build()
}

fn map_search_error(
    err: SdkError<SearchFacesByImageError>,
    collection: &str,
    bucket: &str,
    key: &str,
) -> RecognitionError {
    match err.as_service_error() {
        // Rekognition signals "no face in the query image" through an
        // invalid-parameter rejection rather than an empty result.
        Some(e) if e.is_invalid_parameter_exception() => RecognitionError::NoFaceDetected {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        Some(e) if e.is_resource_not_found_exception() => {
            RecognitionError::CollectionNotFound(collection.to_string())
        }
        Some(e)
            if e.is_invalid_image_format_exception()
                || e.is_image_too_large_exception()
                || e.is_invalid_s3_object_exception() =>
        {
            RecognitionError::InvalidImage {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            }
        }
        Some(e)
            if e.is_provisioned_throughput_exceeded_exception()
                || e.is_throttling_exception() =>
        {
            RecognitionError::Throttled(e.to_string())
        }
        _ => RecognitionError::Service(err.to_string()),
    }
}

fn map_index_error(
    err: SdkError<IndexFacesError>,
    collection: &str,
    bucket: &str,
    key: &str,
) -> RecognitionError {
    match err.as_service_error() {
        Some(e) if e.is_resource_not_found_exception() => {
            RecognitionError::CollectionNotFound(collection.to_string())
        }
        Some(e)
            if e.is_invalid_image_format_exception()
                || e.is_image_too_large_exception()
                || e.is_invalid_s3_object_exception() =>
        {
            RecognitionError::InvalidImage {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            }
        }
        Some(e)
            if e.is_provisioned_throughput_exceeded_exception()
                || e.is_throttling_exception() =>
        {
            RecognitionError::Throttled(e.to_string())
        }
        _ => RecognitionError::Service(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(RecognitionError::Throttled("slow down".into()).is_retryable());
        assert!(RecognitionError::Service("timeout".into()).is_retryable());
        assert!(!RecognitionError::NoFaceDetected {
            bucket: "b".into(),
            key: "k".into()
        }
        .is_retryable());
        assert!(!RecognitionError::CollectionNotFound("c".into()).is_retryable());
        assert!(!RecognitionError::InvalidImage {
            bucket: "b".into(),
            key: "k".into(),
            reason: "corrupt".into()
        }
        .is_retryable());
    }
}
