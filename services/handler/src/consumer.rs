//! Kafka consumer delivering object-store notification batches.
//!
//! Each message payload is one notification batch. Events are routed by
//! bucket to the enrollment or detection handler; the batch report decides
//! whether the offset is committed or the batch is left for redelivery.

use crate::config::{BucketConfig, KafkaConfig};
use crate::detect::DetectionHandler;
use crate::enroll::EnrollmentHandler;
use crate::event::{parse_notification, EventError, ObjectCreatedEvent};
use crate::report::BatchReport;
use anyhow::{Context, Result};
use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Events split by the handler responsible for them.
#[derive(Debug, Default)]
pub(crate) struct RoutedEvents {
    pub enrollment: Vec<ObjectCreatedEvent>,
    pub detection: Vec<ObjectCreatedEvent>,
    /// Events for buckets this service does not watch.
    pub skipped: usize,
}

pub(crate) fn route_events(events: Vec<ObjectCreatedEvent>, buckets: &BucketConfig) -> RoutedEvents {
    let mut routed = RoutedEvents::default();

    for event in events {
        if event.bucket == buckets.enrollment {
            routed.enrollment.push(event);
        } else if event.bucket == buckets.monitoring {
            routed.detection.push(event);
        } else {
            warn!(bucket = %event.bucket, key = %event.key, "Event for unwatched bucket, skipping");
            routed.skipped += 1;
        }
    }

    routed
}

/// Kafka consumer driving both handlers.
pub struct NotificationConsumer {
    consumer: StreamConsumer,
    enrollment: Arc<EnrollmentHandler>,
    detection: Arc<DetectionHandler>,
    buckets: BucketConfig,
}

impl NotificationConsumer {
    /// Create a consumer subscribed to the notifications topic.
    pub fn new(
        config: &KafkaConfig,
        buckets: BucketConfig,
        enrollment: Arc<EnrollmentHandler>,
        detection: Arc<DetectionHandler>,
    ) -> Result<Self> {
        let mut client_config = ClientConfig::new();

        client_config
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set(
                "max.poll.interval.ms",
                config.max_poll_interval_ms.to_string(),
            );

        // Configure SSL if enabled
        if config.ssl_enabled {
            client_config.set("security.protocol", "SASL_SSL");
            if let Some(ref ca_location) = config.ssl_ca_location {
                client_config.set("ssl.ca.location", ca_location);
            }
        }

        // Configure SASL if credentials provided
        if let (Some(ref username), Some(ref password)) =
            (&config.sasl_username, &config.sasl_password)
        {
            client_config
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", username)
                .set("sasl.password", password);
        }

        let consumer: StreamConsumer = client_config
            .create()
            .context("Failed to create Kafka consumer")?;

        consumer
            .subscribe(&[&config.notifications_topic])
            .context("Failed to subscribe to notifications topic")?;

        info!(
            topic = %config.notifications_topic,
            group = %config.consumer_group,
            "Subscribed to Kafka topic"
        );

        Ok(Self {
            consumer,
            enrollment,
            detection,
            buckets,
        })
    }

    /// Start consuming and processing notification batches.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<()> {
        info!("Starting notification consumer");

        let mut message_stream = self.consumer.stream();

        while let Some(message_result) = message_stream.next().await {
            match message_result {
                Ok(message) => {
                    let commit = match self.process_message(&message).await {
                        Ok(report) => {
                            if report.should_redeliver() {
                                warn!(
                                    ok = report.ok,
                                    retryable = report.retryable_failures,
                                    fatal = report.fatal_failures,
                                    "Batch left uncommitted for redelivery"
                                );
                                metrics::counter!("vigil.batches.redelivered").increment(1);
                                false
                            } else {
                                metrics::counter!("vigil.batches.processed").increment(1);
                                true
                            }
                        }
                        Err(e) => {
                            // Redelivering a malformed payload cannot help;
                            // skip past it.
                            error!(
                                error = %e,
                                partition = message.partition(),
                                offset = message.offset(),
                                "Malformed notification payload, skipping"
                            );
                            metrics::counter!("vigil.notifications.malformed").increment(1);
                            true
                        }
                    };

                    if commit {
                        if let Err(e) = self.consumer.commit_message(&message, CommitMode::Async) {
                            warn!(error = %e, "Failed to commit offset");
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Kafka consumer error");
                    metrics::counter!("vigil.kafka.errors").increment(1);
                }
            }
        }

        Ok(())
    }

    /// Parse one message and dispatch its events to the handlers.
    #[instrument(skip(self, message), fields(partition = message.partition(), offset = message.offset()))]
    async fn process_message(
        &self,
        message: &BorrowedMessage<'_>,
    ) -> Result<BatchReport, EventError> {
        let payload = message.payload().unwrap_or(&[]);
        let events = parse_notification(payload)?;

        debug!(events = events.len(), "Received notification batch");

        let routed = route_events(events, &self.buckets);
        if routed.skipped > 0 {
            metrics::counter!("vigil.events.skipped").increment(routed.skipped as u64);
        }

        let mut report = BatchReport::default();
        if !routed.enrollment.is_empty() {
            report.merge(&self.enrollment.handle_batch(&routed.enrollment).await);
        }
        if !routed.detection.is_empty() {
            report.merge(&self.detection.handle_batch(&routed.detection).await);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(bucket: &str, key: &str) -> ObjectCreatedEvent {
        ObjectCreatedEvent {
            bucket: bucket.to_string(),
            key: key.to_string(),
            request_id: "req".to_string(),
            event_time: Utc::now(),
        }
    }

    fn buckets() -> BucketConfig {
        BucketConfig {
            enrollment: "vigil-allowed".to_string(),
            monitoring: "vigil-monitoring".to_string(),
        }
    }

    #[test]
    fn routes_events_by_bucket() {
        let routed = route_events(
            vec![
                event("vigil-allowed", "alice.jpg"),
                event("vigil-monitoring", "cam_1712345678_90.jpg"),
                event("unrelated-bucket", "noise.jpg"),
            ],
            &buckets(),
        );

        assert_eq!(routed.enrollment.len(), 1);
        assert_eq!(routed.enrollment[0].key, "alice.jpg");
        assert_eq!(routed.detection.len(), 1);
        assert_eq!(routed.detection[0].key, "cam_1712345678_90.jpg");
        assert_eq!(routed.skipped, 1);
    }

    #[test]
    fn empty_batch_routes_to_nothing() {
        let routed = route_events(vec![], &buckets());
        assert!(routed.enrollment.is_empty());
        assert!(routed.detection.is_empty());
        assert_eq!(routed.skipped, 0);
    }
}
