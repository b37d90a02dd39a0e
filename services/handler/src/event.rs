//! Object-store notification parsing.
//!
//! The invoking event system delivers batches of object-creation events in
//! the S3 notification JSON shape. This module flattens a raw payload into
//! [`ObjectCreatedEvent`]s, decoding the URL-encoded object key and pinning
//! down the per-event identifiers the handlers need.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Errors raised while parsing a notification payload.
///
/// A malformed payload is never retryable: redelivering the same bytes
/// cannot make them parse.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("failed to deserialize notification payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid encoding in object key: {0}")]
    BadKeyEncoding(String),
}

/// One object-creation event extracted from a notification batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectCreatedEvent {
    /// Bucket the object was written to.
    pub bucket: String,
    /// Object key, already URL-decoded.
    pub key: String,
    /// Delivery request id. Kept on audit records as a dedup token; a
    /// redelivered event carries the same id.
    pub request_id: String,
    /// Time the object store recorded the creation.
    pub event_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct NotificationEnvelope {
    #[serde(rename = "Records", default)]
    records: Vec<NotificationRecord>,
}

#[derive(Debug, Deserialize)]
struct NotificationRecord {
    #[serde(rename = "eventTime")]
    event_time: DateTime<Utc>,
    #[serde(rename = "responseElements", default)]
    response_elements: ResponseElements,
    s3: S3Entity,
}

#[derive(Debug, Deserialize, Default)]
struct ResponseElements {
    #[serde(rename = "x-amz-request-id")]
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: BucketEntity,
    object: ObjectEntity,
}

#[derive(Debug, Deserialize)]
struct BucketEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectEntity {
    key: String,
    #[serde(default)]
    sequencer: Option<String>,
}

/// Parse a raw notification payload into zero-or-more events.
///
/// An empty `Records` array is a valid (if pointless) batch, not an error.
pub fn parse_notification(payload: &[u8]) -> Result<Vec<ObjectCreatedEvent>, EventError> {
    let envelope: NotificationEnvelope = serde_json::from_slice(payload)?;

    envelope
        .records
        .into_iter()
        .map(|record| {
            let key = decode_object_key(&record.s3.object.key)?;
            let request_id = record
                .response_elements
                .request_id
                .or(record.s3.object.sequencer)
                .unwrap_or_else(|| {
                    warn!(key = %key, "notification carries no request id, generating one");
                    Uuid::new_v4().to_string()
                });

            Ok(ObjectCreatedEvent {
                bucket: record.s3.bucket.name,
                key,
                request_id,
                event_time: record.event_time,
            })
        })
        .collect()
}

/// Decode an object key from its notification form.
///
/// Keys arrive URL-encoded with `+` standing in for a space.
fn decode_object_key(raw: &str) -> Result<String, EventError> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .ok_or_else(|| EventError::BadKeyEncoding(raw.to_string()))?;
                let value = u8::from_str_radix(hex, 16)
                    .map_err(|_| EventError::BadKeyEncoding(raw.to_string()))?;
                out.push(value);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8(out).map_err(|_| EventError::BadKeyEncoding(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTIFICATION: &str = r#"{
        "Records": [{
            "eventVersion": "2.1",
            "eventSource": "aws:s3",
            "eventName": "ObjectCreated:Put",
            "eventTime": "2024-04-05T18:14:38.601Z",
            "responseElements": {
                "x-amz-request-id": "C3D13FE58DE4C810",
                "x-amz-id-2": "FMyUVURIY8"
            },
            "s3": {
                "bucket": { "name": "vigil-monitoring" },
                "object": {
                    "key": "cam_1712345678_90.jpg",
                    "size": 52238,
                    "sequencer": "0055AED6DCD90281E5"
                }
            }
        }]
    }"#;

    #[test]
    fn parses_object_created_batch() {
        let events = parse_notification(NOTIFICATION.as_bytes()).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].bucket, "vigil-monitoring");
        assert_eq!(events[0].key, "cam_1712345678_90.jpg");
        assert_eq!(events[0].request_id, "C3D13FE58DE4C810");
    }

    #[test]
    fn empty_records_is_an_empty_batch() {
        let events = parse_notification(br#"{"Records": []}"#).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn falls_back_to_sequencer_when_request_id_missing() {
        let payload = r#"{
            "Records": [{
                "eventTime": "2024-04-05T18:14:38Z",
                "s3": {
                    "bucket": { "name": "b" },
                    "object": { "key": "k.jpg", "sequencer": "00AA" }
                }
            }]
        }"#;

        let events = parse_notification(payload.as_bytes()).unwrap();
        assert_eq!(events[0].request_id, "00AA");
    }

    #[test]
    fn decodes_url_encoded_keys() {
        assert_eq!(decode_object_key("alice+smith.jpg").unwrap(), "alice smith.jpg");
        assert_eq!(decode_object_key("caf%C3%A9.jpg").unwrap(), "café.jpg");
        assert_eq!(decode_object_key("plain.jpg").unwrap(), "plain.jpg");
    }

    #[test]
    fn rejects_truncated_percent_escape() {
        assert!(decode_object_key("bad%2").is_err());
        assert!(decode_object_key("bad%zz").is_err());
    }

    #[test]
    fn malformed_payload_is_not_retryable() {
        assert!(parse_notification(b"not json").is_err());
    }
}
