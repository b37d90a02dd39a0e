//! Detection handler: match a monitored frame against the allowed
//! collection and branch into either an audit write or an intruder alert.

use crate::event::ObjectCreatedEvent;
use crate::faces::{FaceCatalog, FaceMatch, RecognitionError};
use crate::notify::{Alert, AlertSink, NotifyError};
use crate::report::BatchReport;
use crate::store::{AuditRecord, RecordStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// Errors that fail one detection record.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error(transparent)]
    Recognition(#[from] RecognitionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

impl DetectionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Recognition(e) => e.is_retryable(),
            Self::Store(e) => e.is_retryable(),
            Self::Notify(e) => e.is_retryable(),
        }
    }
}

/// Outcome of evaluating search results against the acceptance threshold.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// The best candidate cleared the threshold.
    Allowed { face_id: String, similarity: f32 },
    /// No candidate, or the best candidate fell short.
    Unrecognized,
}

/// Acceptance policy for collection search results.
///
/// Acceptance is strictly `similarity >= threshold` for the single best
/// candidate; at most one match is requested, so there is no tie-break.
#[derive(Debug, Clone)]
pub struct MatchPolicy {
    threshold: f32,
    alert_on_no_face: bool,
}

impl MatchPolicy {
    pub fn new(threshold: f32, alert_on_no_face: bool) -> Self {
        Self {
            threshold,
            alert_on_no_face,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Whether a frame with no detectable face takes the alert path (the
    /// default) or is skipped entirely.
    pub fn alert_on_no_face(&self) -> bool {
        self.alert_on_no_face
    }

    /// Evaluate ranked candidates. The two outcomes are exhaustive and
    /// mutually exclusive.
    pub fn evaluate(&self, candidates: &[FaceMatch]) -> MatchOutcome {
        match candidates.first() {
            Some(best) if best.similarity >= self.threshold => MatchOutcome::Allowed {
                face_id: best.face_id.clone(),
                similarity: best.similarity,
            },
            _ => MatchOutcome::Unrecognized,
        }
    }
}

/// Branch a detection record took. Exposed for tests and logging.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionBranch {
    /// Match cleared the threshold; audit record written.
    Audited { face_id: String, similarity: f32 },
    /// No acceptable match; alert published.
    Alerted,
    /// No acceptable match, but no notification destination is configured.
    AlertSuppressed,
    /// No detectable face and the policy says not to alert on that.
    Skipped,
}

/// Handler for object-creation events on the monitoring path.
pub struct DetectionHandler {
    faces: Arc<dyn FaceCatalog>,
    records: Arc<dyn RecordStore>,
    alerts: Option<Arc<dyn AlertSink>>,
    policy: MatchPolicy,
}

impl DetectionHandler {
    pub fn new(
        faces: Arc<dyn FaceCatalog>,
        records: Arc<dyn RecordStore>,
        alerts: Option<Arc<dyn AlertSink>>,
        policy: MatchPolicy,
    ) -> Self {
        Self {
            faces,
            records,
            alerts,
            policy,
        }
    }

    /// Process every record in a batch independently; a failure on one
    /// record never aborts the others.
    pub async fn handle_batch(&self, events: &[ObjectCreatedEvent]) -> BatchReport {
        let mut report = BatchReport::default();

        for event in events {
            match self.handle_event(event).await {
                Ok(branch) => {
                    debug!(key = %event.key, branch = ?branch, "Detection record completed");
                    report.record_ok();
                }
                Err(e) => {
                    error!(
                        key = %event.key,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Detection record failed"
                    );
                    metrics::counter!("vigil.detections.failed").increment(1);
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
    ) -> Result<DetectionBranch, DetectionError> {
        let candidates = match self
            .faces
            .search_best_match(&event.bucket, &event.key, self.policy.threshold())
            .await
        {
            Ok(candidates) => candidates,
            Err(RecognitionError::NoFaceDetected { .. }) => {
                if self.policy.alert_on_no_face() {
                    // Treated identically to an unrecognized face.
                    Vec::new()
                } else {
                    warn!(key = %event.key, "No face in frame, skipping per policy");
                    metrics::counter!("vigil.detections.no_face_skipped").increment(1);
                    return Ok(DetectionBranch::Skipped);
                }
            }
            Err(e) => return Err(e.into()),
        };

        match self.policy.evaluate(&candidates) {
            MatchOutcome::Allowed {
                face_id,
                similarity,
            } => {
                let record = AuditRecord {
                    face_id: face_id.clone(),
                    similarity,
                    object_key: event.key.clone(),
                    event_time: event.event_time,
                    request_id: event.request_id.clone(),
                };
                self.records.put_audit(&record).await?;

                info!(
                    face_id = %face_id,
                    similarity = similarity,
                    "Allowed face matched"
                );
                metrics::counter!("vigil.detections.allowed").increment(1);

                Ok(DetectionBranch::Audited {
                    face_id,
                    similarity,
                })
            }
            MatchOutcome::Unrecognized => match &self.alerts {
                Some(sink) => {
                    sink.publish(&Alert {
                        object_key: event.key.clone(),
                    })
                    .await?;
                    metrics::counter!("vigil.alerts.published").increment(1);
                    Ok(DetectionBranch::Alerted)
                }
                None => {
                    debug!(key = %event.key, "No match, alerting disabled");
                    metrics::counter!("vigil.alerts.suppressed").increment(1);
                    Ok(DetectionBranch::AlertSuppressed)
                }
            },
        }
    }
}
