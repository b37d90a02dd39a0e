//! Enrollment handler: register a newly uploaded allowed-face image by
//! writing its identity record and indexing the face into the collection.

use crate::event::ObjectCreatedEvent;
use crate::faces::{FaceCatalog, RecognitionError};
use crate::objects::{ObjectDirectory, ObjectStoreError};
use crate::report::BatchReport;
use crate::store::{EnrollmentRecord, RecordStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// Errors that fail one enrollment record.
#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error("metadata read failed for {key}: {source}")]
    Metadata {
        key: String,
        source: ObjectStoreError,
    },

    /// Both independent side effects failed; nothing was registered.
    #[error("record and index both failed for {key}: record: {record}; index: {index}")]
    SideEffects {
        key: String,
        record: StoreError,
        index: RecognitionError,
    },
}

impl EnrollmentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Metadata { source, .. } => source.is_retryable(),
            Self::SideEffects { record, index, .. } => {
                record.is_retryable() || index.is_retryable()
            }
        }
    }
}

/// What one successful enrollment accomplished.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentOutcome {
    pub identity_label: String,
    /// Faces indexed into the collection. A photo with bystanders yields
    /// more than one; all are accepted as-is.
    pub indexed_faces: usize,
    pub record_written: bool,
}

/// Handler for object-creation events on the enrollment path.
pub struct EnrollmentHandler {
    objects: Arc<dyn ObjectDirectory>,
    faces: Arc<dyn FaceCatalog>,
    records: Arc<dyn RecordStore>,
    identity_metadata_key: String,
}

impl EnrollmentHandler {
    pub fn new(
        objects: Arc<dyn ObjectDirectory>,
        faces: Arc<dyn FaceCatalog>,
        records: Arc<dyn RecordStore>,
        identity_metadata_key: impl Into<String>,
    ) -> Self {
        Self {
            objects,
            faces,
            records,
            identity_metadata_key: identity_metadata_key.into(),
        }
    }

    /// Process every record in a batch independently; a failure on one
    /// record never aborts the others.
    pub async fn handle_batch(&self, events: &[ObjectCreatedEvent]) -> BatchReport {
        let mut report = BatchReport::default();

        for event in events {
            match self.handle_event(event).await {
                Ok(outcome) => {
                    debug!(
                        key = %event.key,
                        label = %outcome.identity_label,
                        indexed = outcome.indexed_faces,
                        "Enrollment record completed"
                    );
                    report.record_ok();
                }
                Err(e) => {
                    error!(
                        key = %event.key,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Enrollment record failed"
                    );
                    metrics::counter!("vigil.enrollments.failed").increment(1);
                    report.record_failure(e.is_retryable());
                }
            }
        }

        report
    }

    #[instrument(skip(self, event), fields(bucket = %event.bucket, key = %event.key))]
    pub async fn handle_event(
        &self,
        event: &ObjectCreatedEvent,
    ) -> Result<EnrollmentOutcome, EnrollmentError> {
        let identity_label = self.identity_label(event).await?;

        let record = EnrollmentRecord {
            object_key: event.key.clone(),
            identity_label: identity_label.clone(),
        };

        // The record write and the indexing call are independent,
        // non-transactional side effects: a failure in one never blocks the
        // other, and the record fails only when both do.
        let record_result = self.records.put_enrollment(&record).await;
        if let Err(ref e) = record_result {
            warn!(key = %event.key, error = %e, "Enrollment record write failed");
        }

        let index_result = self
            .faces
            .index_faces(&event.bucket, &event.key, &event.key)
            .await;
        if let Err(ref e) = index_result {
            warn!(key = %event.key, error = %e, "Face indexing failed");
        }

        match (record_result, index_result) {
            (Err(record), Err(index)) => Err(EnrollmentError::SideEffects {
                key: event.key.clone(),
                record,
                index,
            }),
            (record_result, index_result) => {
                let indexed_faces = index_result.map(|faces| faces.len()).unwrap_or(0);

                if indexed_faces == 0 {
                    warn!(key = %event.key, "No face indexed from enrollment image");
                } else {
                    info!(
                        label = %identity_label,
                        indexed = indexed_faces,
                        "Face enrolled into allowed collection"
                    );
                    metrics::counter!("vigil.enrollments.indexed")
                        .increment(indexed_faces as u64);
                }

                Ok(EnrollmentOutcome {
                    identity_label,
                    indexed_faces,
                    record_written: record_result.is_ok(),
                })
            }
        }
    }

    /// Identity label from upload metadata, falling back to the object key
    /// when the field is absent or empty.
    async fn identity_label(&self, event: &ObjectCreatedEvent) -> Result<String, EnrollmentError> {
        let metadata = self
            .objects
            .metadata(&event.bucket, &event.key)
            .await
            .map_err(|source| EnrollmentError::Metadata {
                key: event.key.clone(),
                source,
            })?;

        Ok(metadata
            .get(&self.identity_metadata_key)
            .filter(|label| !label.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| event.key.clone()))
    }
}
