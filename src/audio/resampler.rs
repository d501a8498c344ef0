//! Streaming sample rate conversion using linear interpolation
//!
//! Input arrives one packet at a time. The fractional read position and the
//! last input frame carry over between calls, so concatenated output is the
//! same as resampling the whole stream at once.

/// Linear resampler for interleaved 16-bit audio
#[derive(Debug, Clone)]
pub struct StreamResampler {
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    ratio: f64,        // input_rate / output_rate
    phase: f64,        // Read position in the current chunk; -1.0 is the previous chunk's last frame
    last_frame: Vec<f32>,
    primed: bool,
}

impl StreamResampler {
    /// Create a resampler
    #[must_use]
    pub fn new(input_rate: u32, output_rate: u32, channels: u8) -> Self {
        let input_rate = input_rate.max(1);
        let output_rate = output_rate.max(1);
        let channels = usize::from(channels.max(1));

        tracing::debug!(
            "Initializing linear resampler: {} -> {} (channels={})",
            input_rate,
            output_rate,
            channels
        );

        Self {
            input_rate,
            output_rate,
            channels,
            ratio: f64::from(input_rate) / f64::from(output_rate),
            phase: 0.0,
            last_frame: vec![0.0; channels],
            primed: false,
        }
    }

    /// Input rate in Hz
    #[must_use]
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Output rate in Hz
    #[must_use]
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Whether samples pass through unchanged
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.input_rate == self.output_rate
    }

    /// Resample one chunk of interleaved samples
    ///
    /// A trailing partial frame is ignored.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        reason = "phase is non-negative in the main loop and audio tolerates f32 rounding"
    )]
    pub fn process(&mut self, input: &[i16]) -> Vec<i16> {
        if self.is_passthrough() {
            return input.to_vec();
        }

        let channels = self.channels;
        let frames = input.len() / channels;
        if frames == 0 {
            return Vec::new();
        }

        let sample = |frame: usize, ch: usize| f32::from(input[frame * channels + ch]);
        let capacity = (frames as f64 / self.ratio).ceil() as usize + 1;
        let mut output = Vec::with_capacity(capacity * channels);

        // The very first chunk has no previous frame to blend from
        if !self.primed {
            self.phase = self.phase.max(0.0);
            self.primed = true;
        }

        while self.phase < 0.0 {
            let frac = (self.phase + 1.0) as f32;
            for ch in 0..channels {
                let s0 = self.last_frame[ch];
                let s1 = sample(0, ch);
                output.push(to_i16(s0 * (1.0 - frac) + s1 * frac));
            }
            self.phase += self.ratio;
        }

        while (self.phase.floor() as usize) + 1 < frames {
            let idx = self.phase.floor();
            let frac = (self.phase - idx) as f32;
            let idx = idx as usize;
            for ch in 0..channels {
                let s0 = sample(idx, ch);
                let s1 = sample(idx + 1, ch);
                output.push(to_i16(s0 * (1.0 - frac) + s1 * frac));
            }
            self.phase += self.ratio;
        }

        for ch in 0..channels {
            self.last_frame[ch] = sample(frames - 1, ch);
        }
        self.phase -= frames as f64;

        output
    }

    /// Forget carried state, after a flush
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.last_frame.fill(0.0);
        self.primed = false;
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "value is clamped to the i16 range first"
)]
fn to_i16(value: f32) -> i16 {
    value.round().clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}
