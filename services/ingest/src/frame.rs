//! Raster frames and JPEG encoding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::Cursor;
use thiserror::Error;

/// Errors raised by a frame source or during encoding.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame source failed: {0}")]
    Source(String),

    #[error("frame encoding failed: {0}")]
    Encode(String),
}

/// One RGB24 raster frame from a camera.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Packed RGB pixel data, `width * height * 3` bytes.
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

/// A live sequence of raster frames.
///
/// The camera driver behind this is out of scope; anything that yields
/// frames (a capture device, a video file, a test fixture) can implement it.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` when the source is exhausted.
    async fn next_frame(&mut self) -> Result<Option<RawFrame>, FrameError>;
}

/// Encode a raw frame as JPEG at the given quality.
pub fn encode_jpeg(frame: &RawFrame, quality: u8) -> Result<Vec<u8>, FrameError> {
    let buffer = image::RgbImage::from_raw(frame.width, frame.height, frame.pixels.clone())
        .ok_or_else(|| {
            FrameError::Encode(format!(
                "pixel buffer does not match {}x{} RGB dimensions",
                frame.width, frame.height
            ))
        })?;

    let mut out = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    buffer
        .write_with_encoder(encoder)
        .map_err(|e| FrameError::Encode(e.to_string()))?;

    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32) -> RawFrame {
        RawFrame {
            pixels: vec![128u8; (width * height * 3) as usize],
            width,
            height,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn encodes_a_valid_frame() {
        let jpeg = encode_jpeg(&solid_frame(16, 16), 85).unwrap();
        // JPEG SOI marker
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn rejects_mismatched_pixel_buffer() {
        let frame = RawFrame {
            pixels: vec![0u8; 10],
            width: 16,
            height: 16,
            captured_at: Utc::now(),
        };
        assert!(matches!(
            encode_jpeg(&frame, 85),
            Err(FrameError::Encode(_))
        ));
    }
}
