//! Vigil ingest - frame sampling and background upload
//!
//! This library supplies the ingestion-side machinery of the Vigil pipeline:
//!
//! - A [`frame::FrameSource`] contract for anything that produces raster
//!   frames (the camera driver itself is out of scope).
//! - A [`sampler::FrameSampler`] that selects every Nth frame and assigns
//!   collision-free object keys.
//! - A bounded-queue background uploader ([`uploader`]) so encoding and
//!   upload latency never stall the capture loop.
//! - An [`enrollment::EnrollmentUploader`] that puts allowed-face images
//!   into the enrollment bucket with identity metadata.

pub mod config;
pub mod enrollment;
pub mod frame;
pub mod sampler;
pub mod uploader;

// Re-export main types
pub use config::{IngestConfig, S3Config, SourceConfig, UploadConfig};
pub use enrollment::{EnrollmentUploader, IDENTITY_METADATA_KEY};
pub use frame::{encode_jpeg, FrameError, FrameSource, RawFrame};
pub use sampler::{FrameSampler, SampledFrame};
pub use uploader::{
    pump_frames, run_worker, start, FrameSink, PumpStats, S3FrameSink, UploadError, UploadHandle,
    UploadJob, UploadQueue,
};
