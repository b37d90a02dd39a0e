//! Intruder alert publishing.

use async_trait::async_trait;
use aws_sdk_sns::Client as SnsClient;
use thiserror::Error;
use tracing::{info, instrument};

#[cfg(test)]
use mockall::automock;

/// Errors raised while publishing an alert.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification topic not found: {0}")]
    TopicNotFound(String),

    #[error("notification publish failed: {0}")]
    Service(String),
}

impl NotifyError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Service(_))
    }
}

/// A one-shot intruder alert. Never persisted by the handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    /// Object key of the frame that triggered the no-match branch.
    pub object_key: String,
}

impl Alert {
    pub fn message(&self) -> String {
        format!("Intruder detected in frame {}", self.object_key)
    }
}

/// Fan-out channel for intruder alerts.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn publish(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// SNS-backed [`AlertSink`].
pub struct SnsAlertSink {
    client: SnsClient,
    topic_arn: String,
}

impl SnsAlertSink {
    pub fn new(client: SnsClient, topic_arn: impl Into<String>) -> Self {
        Self {
            client,
            topic_arn: topic_arn.into(),
        }
    }
}

#[async_trait]
impl AlertSink for SnsAlertSink {
    #[instrument(skip(self, alert), fields(key = %alert.object_key))]
    async fn publish(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(alert.message())
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(e) if e.is_not_found_exception() => {
                    NotifyError::TopicNotFound(self.topic_arn.clone())
                }
                _ => NotifyError::Service(err.to_string()),
            })?;

        info!(topic = %self.topic_arn, "Intruder alert published");
        Ok(())
    }
}
