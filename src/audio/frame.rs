use std::sync::Arc;
use std::time::Duration;

/// A block of interleaved 16-bit PCM on a session's output timeline
///
/// Frames are immutable once built; cloning shares the sample storage so a
/// frame can be handed to several sinks.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Arc<[i16]>,
    sample_rate: u32,
    channels: u8,
    timestamp: u64,
}

impl AudioFrame {
    /// Create a frame
    ///
    /// `timestamp` is the offset of the first sample frame from the start of
    /// the session, counted at `sample_rate`.
    #[must_use]
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u8, timestamp: u64) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels: channels.max(1),
            timestamp,
        }
    }

    /// Interleaved samples
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Sample rate in Hz
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count
    #[must_use]
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Output-timeline position of the first sample frame
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Number of sample frames (samples per channel)
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    /// Playback duration
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "frame counts are far below 2^52")]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / f64::from(self.sample_rate))
    }

    /// Whether every sample is zero
    #[must_use]
    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == 0)
    }

    /// Samples as little-endian bytes, the layout most speaker APIs take
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_accessors() {
        let frame = AudioFrame::new(vec![1, -1, 2, -2], 16_000, 2, 320);
        assert_eq!(frame.frame_count(), 2);
        assert_eq!(frame.timestamp(), 320);
        assert_eq!(frame.to_le_bytes(), vec![1, 0, 0xFF, 0xFF, 2, 0, 0xFE, 0xFF]);
        assert!(!frame.is_silent());
    }

    #[test]
    fn test_duration() {
        let frame = AudioFrame::new(vec![0; 32_000], 16_000, 2, 0);
        assert_eq!(frame.duration(), Duration::from_secs(1));
        assert!(frame.is_silent());
    }

    #[test]
    fn test_clone_shares_samples() {
        let frame = AudioFrame::new(vec![7; 8], 16_000, 1, 0);
        let copy = frame.clone();
        assert!(std::ptr::eq(frame.samples(), copy.samples()));
    }
}
