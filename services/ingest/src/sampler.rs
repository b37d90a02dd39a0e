//! Nth-frame sampling and collision-free key naming.

use chrono::{DateTime, Utc};

/// A frame selected for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledFrame {
    /// Object key the frame will be stored under.
    pub key: String,
    /// Position of the frame in the capture sequence (1-based).
    pub sequence: u64,
}

/// Selects every Nth captured frame and assigns it an object key.
///
/// Keys are `{prefix}_{unix_seconds}_{sequence}.jpg`. The sequence counter
/// is strictly increasing, so keys stay unique even when several frames are
/// sampled within the same second; each key is therefore written at most
/// once by a single source.
#[derive(Debug)]
pub struct FrameSampler {
    camera_prefix: String,
    every: u32,
    counter: u64,
}

impl FrameSampler {
    /// `every` below 1 is treated as 1 (sample every frame).
    pub fn new(camera_prefix: impl Into<String>, every: u32) -> Self {
        Self {
            camera_prefix: camera_prefix.into(),
            every: every.max(1),
            counter: 0,
        }
    }

    /// Observe one captured frame; returns the sample when the frame is the
    /// Nth of its cycle.
    pub fn observe(&mut self, captured_at: DateTime<Utc>) -> Option<SampledFrame> {
        self.counter += 1;

        if self.counter % self.every as u64 != 0 {
            return None;
        }

        Some(SampledFrame {
            key: format!(
                "{}_{}_{}.jpg",
                self.camera_prefix,
                captured_at.timestamp(),
                self.counter
            ),
            sequence: self.counter,
        })
    }

    /// Total frames observed so far.
    pub fn frames_seen(&self) -> u64 {
        self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn samples_every_nth_frame() {
        let mut sampler = FrameSampler::new("cam", 30);
        let at = Utc.timestamp_opt(1_712_345_678, 0).unwrap();

        let sampled: Vec<u64> = (0..90)
            .filter_map(|_| sampler.observe(at))
            .map(|s| s.sequence)
            .collect();

        assert_eq!(sampled, vec![30, 60, 90]);
    }

    #[test]
    fn key_matches_capture_time_and_sequence() {
        let mut sampler = FrameSampler::new("cam", 30);
        let at = Utc.timestamp_opt(1_712_345_678, 0).unwrap();

        let sample = (0..90).filter_map(|_| sampler.observe(at)).last().unwrap();
        assert_eq!(sample.key, "cam_1712345678_90.jpg");
    }

    #[test]
    fn keys_stay_unique_within_one_second() {
        let mut sampler = FrameSampler::new("cam", 1);
        let at = Utc.timestamp_opt(1_712_345_678, 0).unwrap();

        let mut keys: Vec<String> = (0..100)
            .filter_map(|_| sampler.observe(at))
            .map(|s| s.key)
            .collect();
        let total = keys.len();

        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }

    #[test]
    fn zero_rate_degrades_to_every_frame() {
        let mut sampler = FrameSampler::new("cam", 0);
        assert!(sampler.observe(Utc::now()).is_some());
    }
}
