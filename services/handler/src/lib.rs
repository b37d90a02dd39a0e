//! Vigil handler - event-driven face matching for intruder detection
//!
//! This library implements the decision core of the Vigil pipeline: the two
//! handlers that react to a newly stored frame.
//!
//! - The [`enroll::EnrollmentHandler`] indexes an uploaded face image into
//!   the allowed collection and records its identity.
//! - The [`detect::DetectionHandler`] searches the collection for a match to
//!   a monitored frame and branches into an audit write (allowed face) or an
//!   intruder alert (no acceptable match).
//!
//! Handlers are stateless and take their collaborators as injected trait
//! objects ([`faces::FaceCatalog`], [`store::RecordStore`],
//! [`objects::ObjectDirectory`], [`notify::AlertSink`]), so tests substitute
//! doubles and the binary wires AWS-backed implementations.

pub mod config;
pub mod consumer;
pub mod detect;
pub mod enroll;
pub mod event;
pub mod faces;
pub mod notify;
pub mod objects;
pub mod report;
pub mod store;

// Re-export main types
pub use config::{
    AlertConfig, AuditConfig, AwsConfig, BucketConfig, ConfigValidationError, HandlerConfig,
    KafkaConfig, RecognitionConfig, ServiceConfig,
};
pub use consumer::NotificationConsumer;
pub use detect::{DetectionBranch, DetectionError, DetectionHandler, MatchOutcome, MatchPolicy};
pub use enroll::{EnrollmentError, EnrollmentHandler, EnrollmentOutcome};
pub use event::{parse_notification, EventError, ObjectCreatedEvent};
pub use faces::{FaceCatalog, FaceMatch, IndexedFace, RecognitionError, RekognitionCatalog};
pub use notify::{Alert, AlertSink, NotifyError, SnsAlertSink};
pub use objects::{ObjectDirectory, ObjectStoreError, S3ObjectDirectory};
pub use report::BatchReport;
pub use store::{AuditRecord, DynamoRecordStore, EnrollmentRecord, RecordStore, StoreError};
