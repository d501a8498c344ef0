//! RTP framing for RAOP audio, control, and timing channels

mod control;
mod packet;
mod timing;


pub use control::{ControlPacket, SyncPacket};
pub use packet::{PayloadType, RtpDecodeError, RtpHeader, RtpPacket};
pub use timing::{NtpTimestamp, TimingRequest, TimingResponse};

/// RAOP stream constants
pub mod constants {
    /// Audio frames per RTP packet (352 samples at 44.1kHz ≈ 8ms)
    pub const FRAMES_PER_PACKET: u32 = 352;

    /// Sender sample rate
    pub const SAMPLE_RATE: u32 = 44100;

    /// Audio channels (stereo)
    pub const CHANNELS: u8 = 2;

    /// Latency reported in RECORD responses, in sender samples
    pub const AUDIO_LATENCY: u32 = 2205;
}
