//! Audio pipeline: reorder, decode, conceal, resample, queue
//!
//! Packets enter through [`AudioPipeline::push_packet`] and leave as
//! [`AudioFrame`]s on a bounded [`FrameQueue`] at the target's output rate.

pub mod decoder;
pub mod format;
pub mod frame;
pub mod jitter;
pub mod pipeline;
pub mod queue;
pub mod resampler;


pub use decoder::{DecodeError, PacketDecoder, PcmDecoder, decoder_for};
#[cfg(feature = "decoders")]
pub use decoder::AlacDecoder;
pub use format::{AudioCodec, StreamParameters};
pub use frame::AudioFrame;
pub use jitter::{JitterBuffer, JitterConfig, JitterResult, JitterStats, NextPacket};
pub use pipeline::{AudioPipeline, PipelineStats};
pub use queue::{FrameQueue, FrameStream, QueueStats};
pub use resampler::StreamResampler;
