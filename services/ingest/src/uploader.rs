//! Background frame upload with a bounded handoff queue.
//!
//! The capture loop submits sampled frames without blocking; a background
//! task encodes and uploads them. When the queue is full the frame is
//! dropped and counted, so encoding or upload latency never stalls frame
//! capture or display.

use crate::config::S3Config;
use crate::frame::{encode_jpeg, FrameError, FrameSource, RawFrame};
use crate::sampler::{FrameSampler, SampledFrame};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Errors raised while storing a frame.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("frame store request failed: {0}")]
    Service(String),
}

/// Destination for encoded frames.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn store_frame(&self, key: &str, jpeg: Vec<u8>) -> Result<(), UploadError>;
}

/// S3-backed [`FrameSink`] for the monitoring bucket.
pub struct S3FrameSink {
    client: S3Client,
    bucket: String,
}

impl S3FrameSink {
    /// Create a sink from configuration, building the S3 client.
    pub async fn new(config: &S3Config) -> anyhow::Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 frame sink initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl FrameSink for S3FrameSink {
    async fn store_frame(&self, key: &str, jpeg: Vec<u8>) -> Result<(), UploadError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(jpeg))
            .content_type("image/jpeg")
            .send()
            .await
            .map_err(|e| UploadError::Service(e.to_string()))?;

        debug!(bucket = %self.bucket, key = %key, "Frame uploaded");
        Ok(())
    }
}

/// One sampled frame waiting to be encoded and uploaded.
#[derive(Debug)]
pub struct UploadJob {
    pub key: String,
    pub frame: RawFrame,
}

/// Capture-side handle to the upload queue.
#[derive(Clone)]
pub struct UploadHandle {
    tx: mpsc::Sender<UploadJob>,
    dropped: Arc<AtomicU64>,
}

impl UploadHandle {
    /// Submit a frame without blocking. Returns `false` when the queue is
    /// full and the frame was dropped.
    pub fn try_submit(&self, job: UploadJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                warn!(key = %job.key, "Upload queue full, dropping frame");
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Closed(job)) => {
                warn!(key = %job.key, "Upload worker gone, dropping frame");
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Frames dropped because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Bounded handoff between the capture loop and the upload worker.
pub struct UploadQueue;

impl UploadQueue {
    /// Create the queue without starting a worker. Useful for tests; most
    /// callers want [`start`].
    pub fn channel(depth: usize) -> (UploadHandle, mpsc::Receiver<UploadJob>) {
        let (tx, rx) = mpsc::channel(depth);
        (
            UploadHandle {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }
}

/// Drain the queue into the sink until every handle is dropped.
///
/// An upload failure loses that one frame; the worker keeps going. The
/// monitored stream is a sampled feed, so a lost frame costs one detection
/// opportunity, not correctness.
pub async fn run_worker(
    mut rx: mpsc::Receiver<UploadJob>,
    sink: Arc<dyn FrameSink>,
    jpeg_quality: u8,
) {
    while let Some(job) = rx.recv().await {
        let jpeg = match encode_jpeg(&job.frame, jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                error!(key = %job.key, error = %e, "Frame encoding failed");
                continue;
            }
        };

        if let Err(e) = sink.store_frame(&job.key, jpeg).await {
            error!(key = %job.key, error = %e, "Frame upload failed");
        }
    }

    debug!("Upload worker finished");
}

/// Start the background uploader; returns the capture-side handle and the
/// worker's join handle.
pub fn start(
    sink: Arc<dyn FrameSink>,
    jpeg_quality: u8,
    queue_depth: usize,
) -> (UploadHandle, JoinHandle<()>) {
    let (handle, rx) = UploadQueue::channel(queue_depth);
    let worker = tokio::spawn(run_worker(rx, sink, jpeg_quality));
    (handle, worker)
}

/// Counters from one run of the capture loop.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PumpStats {
    pub frames_seen: u64,
    pub frames_sampled: u64,
    pub frames_dropped: u64,
}

/// Drive a frame source through the sampler into the upload queue until the
/// source is exhausted.
pub async fn pump_frames<S: FrameSource>(
    source: &mut S,
    sampler: &mut FrameSampler,
    uploads: &UploadHandle,
) -> Result<PumpStats, FrameError> {
    let mut stats = PumpStats::default();

    while let Some(frame) = source.next_frame().await? {
        stats.frames_seen += 1;

        if let Some(SampledFrame { key, .. }) = sampler.observe(frame.captured_at) {
            stats.frames_sampled += 1;
            if !uploads.try_submit(UploadJob { key, frame }) {
                stats.frames_dropped += 1;
            }
        }
    }

    info!(
        seen = stats.frames_seen,
        sampled = stats.frames_sampled,
        dropped = stats.frames_dropped,
        "Frame source exhausted"
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::Mutex;

    fn job(key: &str) -> UploadJob {
        UploadJob {
            key: key.to_string(),
            frame: RawFrame {
                pixels: vec![0u8; 4 * 4 * 3],
                width: 4,
                height: 4,
                captured_at: Utc::now(),
            },
        }
    }

    /// Records stored keys.
    struct RecordingSink {
        keys: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                keys: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn store_frame(&self, key: &str, _jpeg: Vec<u8>) -> Result<(), UploadError> {
            self.keys.lock().await.push(key.to_string());
            Ok(())
        }
    }

    /// Yields a fixed number of frames, then ends.
    struct CountedSource {
        remaining: u32,
    }

    #[async_trait]
    impl FrameSource for CountedSource {
        async fn next_frame(&mut self) -> Result<Option<RawFrame>, FrameError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(RawFrame {
                pixels: vec![0u8; 4 * 4 * 3],
                width: 4,
                height: 4,
                captured_at: Utc::now(),
            }))
        }
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        // No worker draining the queue: depth 2 admits two jobs, the third
        // is dropped immediately.
        let (handle, _rx) = UploadQueue::channel(2);

        assert!(handle.try_submit(job("a.jpg")));
        assert!(handle.try_submit(job("b.jpg")));
        assert!(!handle.try_submit(job("c.jpg")));
        assert_eq!(handle.dropped(), 1);
    }

    #[test]
    fn closed_queue_drops_without_blocking() {
        let (handle, rx) = UploadQueue::channel(2);
        drop(rx);

        assert!(!handle.try_submit(job("a.jpg")));
        assert_eq!(handle.dropped(), 1);
    }

    #[tokio::test]
    async fn worker_encodes_and_stores_submitted_frames() {
        let sink = Arc::new(RecordingSink::new());
        let (handle, rx) = UploadQueue::channel(8);
        let worker = tokio::spawn(run_worker(rx, sink.clone(), 85));

        assert!(handle.try_submit(job("cam_1712345678_30.jpg")));
        assert!(handle.try_submit(job("cam_1712345678_60.jpg")));
        drop(handle);
        worker.await.unwrap();

        let keys = sink.keys.lock().await;
        assert_eq!(
            *keys,
            vec!["cam_1712345678_30.jpg", "cam_1712345678_60.jpg"]
        );
    }

    #[tokio::test]
    async fn pump_samples_every_nth_frame() {
        let mut source = CountedSource { remaining: 90 };
        let mut sampler = FrameSampler::new("cam", 30);
        let (handle, _rx) = UploadQueue::channel(8);

        let stats = pump_frames(&mut source, &mut sampler, &handle)
            .await
            .unwrap();

        assert_eq!(stats.frames_seen, 90);
        assert_eq!(stats.frames_sampled, 3);
        assert_eq!(stats.frames_dropped, 0);
    }

    #[tokio::test]
    async fn pump_counts_drops_from_a_full_queue() {
        let mut source = CountedSource { remaining: 90 };
        let mut sampler = FrameSampler::new("cam", 30);
        // Depth 1 and no worker: first sample queues, the rest drop.
        let (handle, _rx) = UploadQueue::channel(1);

        let stats = pump_frames(&mut source, &mut sampler, &handle)
            .await
            .unwrap();

        assert_eq!(stats.frames_sampled, 3);
        assert_eq!(stats.frames_dropped, 2);
        assert_eq!(handle.dropped(), 2);
    }
}
