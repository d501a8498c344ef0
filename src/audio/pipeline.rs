//! Per-session audio pipeline
//!
//! Packets are reordered by the jitter buffer, decoded, resampled to the
//! target's output rate, and published as [`AudioFrame`]s on a
//! [`FrameQueue`]. Missing packets become silence of the same length so the
//! output timeline never jumps.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use super::decoder::{DecodeError, PacketDecoder, decoder_for};
use super::format::StreamParameters;
use super::frame::AudioFrame;
use super::jitter::{JitterBuffer, JitterConfig, JitterResult, JitterStats, NextPacket};
use super::queue::FrameQueue;
use super::resampler::StreamResampler;
use crate::diagnostics::DiagnosticThrottle;

/// Pipeline counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Packets decoded successfully
    pub packets_decoded: u64,
    /// Packets that failed to decode and were replaced with silence
    pub decode_failures: u64,
    /// Frames published
    pub frames_emitted: u64,
    /// Frames of silence published for gaps
    pub silence_frames: u64,
    /// Frames the queue evicted
    pub frames_evicted: u64,
    /// Output-timeline position, in output sample frames
    pub timeline_position: u64,
    /// Jitter buffer counters
    pub jitter: JitterStats,
}

/// Reorder, decode, conceal, resample, publish
pub struct AudioPipeline {
    jitter: JitterBuffer<Bytes>,
    decoder: Box<dyn PacketDecoder>,
    resampler: StreamResampler,
    queue: Arc<FrameQueue>,
    output_rate: u32,
    channels: u8,
    frames_per_packet: usize,
    timestamp: u64,
    stats: PipelineStats,
    decode_warnings: DiagnosticThrottle,
}

impl AudioPipeline {
    /// Build a pipeline for a negotiated stream
    ///
    /// # Errors
    /// Returns `DecodeError` if no decoder exists for the stream's codec.
    pub fn new(
        params: &StreamParameters,
        output_rate: u32,
        jitter: JitterConfig,
        queue: Arc<FrameQueue>,
    ) -> Result<Self, DecodeError> {
        let decoder = decoder_for(params)?;
        Ok(Self::with_decoder(
            decoder,
            params.frames_per_packet,
            output_rate,
            jitter,
            queue,
        ))
    }

    /// Build a pipeline around an existing decoder
    #[must_use]
    pub fn with_decoder(
        decoder: Box<dyn PacketDecoder>,
        frames_per_packet: u32,
        output_rate: u32,
        jitter: JitterConfig,
        queue: Arc<FrameQueue>,
    ) -> Self {
        let channels = decoder.channels();
        let resampler = StreamResampler::new(decoder.sample_rate(), output_rate, channels);

        tracing::debug!(
            input_rate = decoder.sample_rate(),
            output_rate,
            channels,
            frames_per_packet,
            "Audio pipeline created"
        );

        Self {
            jitter: JitterBuffer::new(jitter),
            decoder,
            resampler,
            queue,
            output_rate,
            channels,
            frames_per_packet: usize::try_from(frames_per_packet).unwrap_or(usize::MAX),
            timestamp: 0,
            stats: PipelineStats::default(),
            decode_warnings: DiagnosticThrottle::default(),
        }
    }

    /// Expect `seq` as the first packet
    pub fn start_at(&mut self, seq: u16) {
        self.jitter.start_at(seq);
    }

    /// Accept a packet and publish whatever is now ready
    pub fn push_packet(&mut self, seq: u16, payload: Bytes, now: Instant) -> JitterResult {
        let result = self.jitter.push(seq, payload, now);
        match &result {
            JitterResult::TooLate => tracing::trace!(seq, "Dropping late packet"),
            JitterResult::Duplicate => tracing::trace!(seq, "Dropping duplicate packet"),
            JitterResult::Resynced { discarded } => {
                tracing::debug!(seq, discarded, "Sequence jumped, resynchronizing");
                self.decoder.reset();
            }
            JitterResult::Buffered => {}
        }
        self.poll(now);
        result
    }

    /// Publish ready packets and overdue gaps; returns frames published
    pub fn poll(&mut self, now: Instant) -> usize {
        self.release(now, false)
    }

    /// Publish everything buffered, concealing any holes immediately
    pub fn drain(&mut self, now: Instant) -> usize {
        self.release(now, true)
    }

    fn release(&mut self, now: Instant, force: bool) -> usize {
        let mut emitted = 0;
        loop {
            let next = if force {
                self.jitter.pop_now(now)
            } else {
                self.jitter.pop(now)
            };

            match next {
                NextPacket::Ready { sequence, packet } => {
                    let samples = self.decode(sequence, &packet, now);
                    emitted += usize::from(self.publish(&samples, false));
                }
                NextPacket::Gap { first, missing } => {
                    tracing::debug!(first, missing, "Concealing lost packets");
                    self.decoder.reset();
                    let len = usize::from(missing)
                        * self.frames_per_packet
                        * usize::from(self.channels);
                    emitted += usize::from(self.publish(&vec![0; len], true));
                }
                NextPacket::Wait => break,
            }
        }
        emitted
    }

    fn decode(&mut self, sequence: u16, payload: &[u8], now: Instant) -> Vec<i16> {
        match self.decoder.decode(payload) {
            Ok(samples) => {
                self.stats.packets_decoded += 1;
                samples
            }
            Err(e) => {
                self.stats.decode_failures += 1;
                if let Some(suppressed) = self.decode_warnings.check(now) {
                    tracing::warn!(sequence, suppressed, "Failed to decode packet: {}", e);
                }
                vec![0; self.frames_per_packet * usize::from(self.channels)]
            }
        }
    }

    fn publish(&mut self, samples: &[i16], silence: bool) -> bool {
        let resampled = self.resampler.process(samples);
        if resampled.is_empty() {
            return false;
        }

        let frame = AudioFrame::new(resampled, self.output_rate, self.channels, self.timestamp);
        self.timestamp += frame.frame_count() as u64;
        self.stats.frames_emitted += 1;
        if silence {
            self.stats.silence_frames += 1;
        }
        if self.queue.push(frame).is_some() {
            self.stats.frames_evicted += 1;
        }
        true
    }

    /// Discard buffered audio; the output timeline continues where it was
    pub fn flush(&mut self) {
        self.jitter.reset();
        self.decoder.reset();
        self.resampler.reset();
        self.queue.clear();
    }

    /// End the frame stream
    pub fn close(&self) {
        self.queue.close();
    }

    /// Queue the pipeline publishes to
    #[must_use]
    pub fn frames(&self) -> &Arc<FrameQueue> {
        &self.queue
    }

    /// Sequence number the jitter buffer expects next
    #[must_use]
    pub fn next_sequence(&self) -> Option<u16> {
        self.jitter.next_sequence()
    }

    /// Packets waiting in the jitter buffer
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.jitter.depth()
    }

    /// Output sample rate
    #[must_use]
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Counters
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            timeline_position: self.timestamp,
            jitter: self.jitter.stats(),
            ..self.stats.clone()
        }
    }
}
