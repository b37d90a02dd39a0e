use serde::Deserialize;
use thiserror::Error;

/// Main configuration for the handler service.
///
/// Required values (Kafka bootstrap servers, bucket names, collection id,
/// table name) have no defaults: a missing value fails deserialization at
/// startup, and the process refuses to start rather than failing per event.
#[derive(Debug, Clone, Deserialize)]
pub struct HandlerConfig {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Kafka configuration
    pub kafka: KafkaConfig,
    /// AWS client configuration
    #[serde(default)]
    pub aws: AwsConfig,
    /// Bucket routing configuration
    pub buckets: BucketConfig,
    /// Face recognition configuration
    pub recognition: RecognitionConfig,
    /// Audit record store configuration
    pub audit: AuditConfig,
    /// Alerting configuration
    #[serde(default)]
    pub alerting: AlertConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Kafka consumer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers
    pub bootstrap_servers: String,
    /// Consumer group ID
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    /// Topic carrying object-store notification batches
    #[serde(default = "default_notifications_topic")]
    pub notifications_topic: String,
    /// Enable SSL
    #[serde(default)]
    pub ssl_enabled: bool,
    /// SSL CA certificate path
    pub ssl_ca_location: Option<String>,
    /// SASL username
    pub sasl_username: Option<String>,
    /// SASL password
    pub sasl_password: Option<String>,
    /// Auto offset reset policy
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
    /// Session timeout in milliseconds
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u32,
    /// Max poll interval in milliseconds
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u32,
}

/// AWS client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for LocalStack)
    pub endpoint_url: Option<String>,
    /// Force path-style S3 access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Buckets the consumer routes events by
#[derive(Debug, Clone, Deserialize)]
pub struct BucketConfig {
    /// Bucket receiving enrollment images
    pub enrollment: String,
    /// Bucket receiving monitored camera frames
    pub monitoring: String,
}

/// Face recognition configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionConfig {
    /// Allowed-faces collection id
    pub collection_id: String,
    /// Acceptance threshold for the best match, in [0, 100]
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Object metadata field carrying the identity label on enrollment
    #[serde(default = "default_identity_metadata_key")]
    pub identity_metadata_key: String,
    /// Treat a frame with no detectable face like an unrecognized face
    /// (alert path). Disabling this skips such frames instead.
    #[serde(default = "default_true")]
    pub alert_on_no_face: bool,
}

/// Audit record store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// DynamoDB table holding enrollment and audit records
    pub table_name: String,
}

/// Alerting configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AlertConfig {
    /// SNS topic ARN for intruder alerts. Absent means alerting is disabled.
    pub topic_arn: Option<String>,
}

/// Configuration validation failures, all fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("required configuration value is empty: {0}")]
    EmptyValue(&'static str),

    #[error("similarity threshold {0} is outside [0, 100]")]
    ThresholdOutOfRange(f32),

    #[error("enrollment and monitoring buckets must differ: {0}")]
    AmbiguousBuckets(String),
}

// Default value functions
fn default_service_name() -> String {
    "vigil-handler".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_consumer_group() -> String {
    "vigil-handler".to_string()
}

fn default_notifications_topic() -> String {
    "vigil.object.notifications".to_string()
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_session_timeout_ms() -> u32 {
    30000
}

fn default_max_poll_interval_ms() -> u32 {
    300000
}

fn default_region() -> String {
    "us-east-2".to_string()
}

fn default_similarity_threshold() -> f32 {
    80.0
}

fn default_identity_metadata_key() -> String {
    "fullname".to_string()
}

fn default_true() -> bool {
    true
}

impl HandlerConfig {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/handler").required(false))
            .add_source(config::File::with_name("/etc/vigil/handler").required(false))
            // VIGIL__RECOGNITION__COLLECTION_ID -> recognition.collection_id
            .add_source(
                config::Environment::with_prefix("VIGIL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: HandlerConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate values deserialization alone cannot reject.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.kafka.bootstrap_servers.trim().is_empty() {
            return Err(ConfigValidationError::EmptyValue("kafka.bootstrap_servers"));
        }
        if self.buckets.enrollment.trim().is_empty() {
            return Err(ConfigValidationError::EmptyValue("buckets.enrollment"));
        }
        if self.buckets.monitoring.trim().is_empty() {
            return Err(ConfigValidationError::EmptyValue("buckets.monitoring"));
        }
        if self.buckets.enrollment == self.buckets.monitoring {
            return Err(ConfigValidationError::AmbiguousBuckets(
                self.buckets.enrollment.clone(),
            ));
        }
        if self.recognition.collection_id.trim().is_empty() {
            return Err(ConfigValidationError::EmptyValue("recognition.collection_id"));
        }
        if self.audit.table_name.trim().is_empty() {
            return Err(ConfigValidationError::EmptyValue("audit.table_name"));
        }
        if !(0.0..=100.0).contains(&self.recognition.similarity_threshold) {
            return Err(ConfigValidationError::ThresholdOutOfRange(
                self.recognition.similarity_threshold,
            ));
        }
        Ok(())
    }
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> HandlerConfig {
        HandlerConfig {
            service: ServiceConfig::default(),
            kafka: KafkaConfig {
                bootstrap_servers: "localhost:9092".to_string(),
                consumer_group: default_consumer_group(),
                notifications_topic: default_notifications_topic(),
                ssl_enabled: false,
                ssl_ca_location: None,
                sasl_username: None,
                sasl_password: None,
                auto_offset_reset: default_auto_offset_reset(),
                session_timeout_ms: default_session_timeout_ms(),
                max_poll_interval_ms: default_max_poll_interval_ms(),
            },
            aws: AwsConfig::default(),
            buckets: BucketConfig {
                enrollment: "vigil-allowed".to_string(),
                monitoring: "vigil-monitoring".to_string(),
            },
            recognition: RecognitionConfig {
                collection_id: "allowed-people".to_string(),
                similarity_threshold: default_similarity_threshold(),
                identity_metadata_key: default_identity_metadata_key(),
                alert_on_no_face: true,
            },
            audit: AuditConfig {
                table_name: "vigil-records".to_string(),
            },
            alerting: AlertConfig::default(),
        }
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_similarity_threshold(), 80.0);
        assert_eq!(default_identity_metadata_key(), "fullname");
        assert_eq!(default_region(), "us-east-2");
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn empty_collection_id_is_fatal() {
        let mut config = valid_config();
        config.recognition.collection_id = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::EmptyValue("recognition.collection_id"))
        ));
    }

    #[test]
    fn out_of_range_threshold_is_fatal() {
        let mut config = valid_config();
        config.recognition.similarity_threshold = 120.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::ThresholdOutOfRange(_))
        ));
    }

    #[test]
    fn shared_bucket_name_is_fatal() {
        let mut config = valid_config();
        config.buckets.monitoring = config.buckets.enrollment.clone();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::AmbiguousBuckets(_))
        ));
    }

    #[test]
    fn missing_topic_arn_means_alerting_disabled() {
        let config = valid_config();
        assert!(config.alerting.topic_arn.is_none());
    }
}
