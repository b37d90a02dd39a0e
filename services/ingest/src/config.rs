//! Configuration for the ingestion side.

use serde::Deserialize;

/// Main configuration for frame ingestion.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Frame source configuration
    #[serde(default)]
    pub source: SourceConfig,
    /// S3 upload configuration
    pub s3: S3Config,
    /// Upload queue configuration
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Frame source configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Key prefix identifying this camera
    #[serde(default = "default_camera_prefix")]
    pub camera_prefix: String,
    /// Upload every Nth captured frame
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

/// S3 upload configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket receiving monitored frames
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Upload handoff configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Bounded queue depth between the capture loop and the uploader
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// JPEG quality for encoded frames (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

// Default value functions
fn default_camera_prefix() -> String {
    "cam".to_string()
}

fn default_frame_rate() -> u32 {
    30
}

fn default_region() -> String {
    "us-east-2".to_string()
}

fn default_queue_depth() -> usize {
    8
}

fn default_jpeg_quality() -> u8 {
    85
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            camera_prefix: default_camera_prefix(),
            frame_rate: default_frame_rate(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/ingest").required(false))
            .add_source(config::File::with_name("/etc/vigil/ingest").required(false))
            // INGEST__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("INGEST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}
