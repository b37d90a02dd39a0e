//! Durable record store for enrollment and detection audit records.
//!
//! The table keeps the original wire attributes (`FaceId`, `Timestamp`,
//! `Similarity`, `S3Key`) with `FaceId` as the partition key and `Timestamp`
//! as the sort key. Enrollment records use the object key as `FaceId` with a
//! zero timestamp; audit records use the matched face id with the event time
//! in milliseconds, so replaying an event overwrites the same item instead
//! of accumulating duplicates.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, instrument};

#[cfg(test)]
use mockall::automock;

/// Errors raised while writing records.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store throttled: {0}")]
    Throttled(String),

    #[error("record write rejected: {0}")]
    Rejected(String),

    #[error("record store request failed: {0}")]
    Service(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Service(_))
    }
}

/// Identity registered for an enrolled face image.
///
/// Written exactly once per successful enrollment; last-write-wins on
/// redelivery since the object key is the item key.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentRecord {
    /// Object key of the enrollment image.
    pub object_key: String,
    /// Human-readable identity label.
    pub identity_label: String,
}

/// Audit trail entry for a monitored frame that matched an allowed face.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    /// Face identifier assigned by the recognition service.
    pub face_id: String,
    /// Similarity score in [0, 100].
    pub similarity: f32,
    /// Object key of the triggering frame.
    pub object_key: String,
    /// Event time used as the ordering key.
    pub event_time: DateTime<Utc>,
    /// Delivery request id, kept as a dedup token.
    pub request_id: String,
}

/// Write-side interface to the record store.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn put_enrollment(&self, record: &EnrollmentRecord) -> Result<(), StoreError>;

    async fn put_audit(&self, record: &AuditRecord) -> Result<(), StoreError>;
}

/// DynamoDB-backed [`RecordStore`].
pub struct DynamoRecordStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoRecordStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    async fn put_item(&self, item: HashMap<String, AttributeValue>) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(e) if e.is_provisioned_throughput_exceeded_exception() => {
                    StoreError::Throttled(e.to_string())
                }
                Some(e) if e.is_resource_not_found_exception() => {
                    StoreError::Rejected(format!("table not found: {}", self.table_name))
                }
                _ => StoreError::Service(err.to_string()),
            })?;

        Ok(())
    }
}

#[async_trait]
impl RecordStore for DynamoRecordStore {
    #[instrument(skip(self, record), fields(key = %record.object_key))]
    async fn put_enrollment(&self, record: &EnrollmentRecord) -> Result<(), StoreError> {
        self.put_item(enrollment_item(record)).await?;
        debug!(label = %record.identity_label, "Enrollment record written");
        Ok(())
    }

    #[instrument(skip(self, record), fields(key = %record.object_key, face_id = %record.face_id))]
    async fn put_audit(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.put_item(audit_item(record)).await?;
        debug!(similarity = record.similarity, "Audit record written");
        Ok(())
    }
}

/// Item for an enrollment record: keyed by the object key with a placeholder
/// zero timestamp and no similarity.
fn enrollment_item(record: &EnrollmentRecord) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (
            "FaceId".to_string(),
            AttributeValue::S(record.object_key.clone()),
        ),
        ("Timestamp".to_string(), AttributeValue::N("0".to_string())),
        (
            "S3Key".to_string(),
            AttributeValue::S(record.identity_label.clone()),
        ),
    ])
}

/// Item for a detection audit record: keyed by face id and event time, with
/// the request id carried alongside as a dedup token.
fn audit_item(record: &AuditRecord) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (
            "FaceId".to_string(),
            AttributeValue::S(record.face_id.clone()),
        ),
        (
            "Timestamp".to_string(),
            AttributeValue::N(record.event_time.timestamp_millis().to_string()),
        ),
        (
            "Similarity".to_string(),
            AttributeValue::N(record.similarity.to_string()),
        ),
        (
            "S3Key".to_string(),
            AttributeValue::S(record.object_key.clone()),
        ),
        (
            "RequestId".to_string(),
            AttributeValue::S(record.request_id.clone()),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_audit() -> AuditRecord {
        AuditRecord {
            face_id: "1c1f38ed-2c49-45a4-a2fc-6e154cf273de".to_string(),
            similarity: 92.0,
            object_key: "cam_1712345678_90.jpg".to_string(),
            event_time: Utc.with_ymd_and_hms(2024, 4, 5, 18, 14, 38).unwrap(),
            request_id: "C3D13FE58DE4C810".to_string(),
        }
    }

    #[test]
    fn enrollment_item_has_zero_timestamp_and_no_similarity() {
        let item = enrollment_item(&EnrollmentRecord {
            object_key: "alice.jpg".to_string(),
            identity_label: "Alice Smith".to_string(),
        });

        assert_eq!(item["FaceId"], AttributeValue::S("alice.jpg".into()));
        assert_eq!(item["Timestamp"], AttributeValue::N("0".into()));
        assert_eq!(item["S3Key"], AttributeValue::S("Alice Smith".into()));
        assert!(!item.contains_key("Similarity"));
    }

    #[test]
    fn audit_item_carries_match_and_ordering_key() {
        let item = audit_item(&sample_audit());

        assert_eq!(
            item["FaceId"],
            AttributeValue::S("1c1f38ed-2c49-45a4-a2fc-6e154cf273de".into())
        );
        assert_eq!(item["Similarity"], AttributeValue::N("92".into()));
        assert_eq!(
            item["S3Key"],
            AttributeValue::S("cam_1712345678_90.jpg".into())
        );
        assert_eq!(
            item["RequestId"],
            AttributeValue::S("C3D13FE58DE4C810".into())
        );
    }

    #[test]
    fn replayed_event_maps_to_the_same_item_key() {
        // At-least-once delivery replays the event with identical fields, so
        // the (FaceId, Timestamp) item key is identical and the write is a
        // last-write-wins overwrite, not a duplicate.
        let first = audit_item(&sample_audit());
        let replay = audit_item(&sample_audit());

        assert_eq!(first["FaceId"], replay["FaceId"]);
        assert_eq!(first["Timestamp"], replay["Timestamp"]);
        assert_eq!(first, replay);
    }

    #[test]
    fn retryable_classification() {
        assert!(StoreError::Throttled("limit".into()).is_retryable());
        assert!(StoreError::Service("timeout".into()).is_retryable());
        assert!(!StoreError::Rejected("table not found".into()).is_retryable());
    }
}
