//! Negotiated stream formats

use crate::protocol::sdp::{AlacParameters, EncryptionParams};

/// Audio codecs a RAOP sender may announce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    /// Raw 16-bit big-endian PCM (L16)
    Pcm,
    /// Apple Lossless
    Alac,
    /// AAC Low Complexity
    AacLc,
    /// AAC Enhanced Low Delay
    AacEld,
}

impl std::fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioCodec::Pcm => write!(f, "L16"),
            AudioCodec::Alac => write!(f, "ALAC"),
            AudioCodec::AacLc => write!(f, "AAC-LC"),
            AudioCodec::AacEld => write!(f, "AAC-ELD"),
        }
    }
}

/// Stream parameters announced in SDP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParameters {
    /// Codec
    pub codec: AudioCodec,
    /// Sender sample rate
    pub sample_rate: u32,
    /// Bits per sample
    pub bits_per_sample: u8,
    /// Channel count
    pub channels: u8,
    /// Frames carried by each RTP packet
    pub frames_per_packet: u32,
    /// ALAC decoder parameters, when the codec is ALAC
    pub alac: Option<AlacParameters>,
    /// Encryption parameters, when the stream is encrypted
    pub encryption: Option<EncryptionParams>,
    /// Sender's minimum latency in samples
    pub min_latency: Option<u32>,
}

impl StreamParameters {
    /// Unencrypted 16-bit PCM
    #[must_use]
    pub fn pcm(sample_rate: u32, channels: u8, frames_per_packet: u32) -> Self {
        Self {
            codec: AudioCodec::Pcm,
            sample_rate,
            bits_per_sample: 16,
            channels,
            frames_per_packet,
            alac: None,
            encryption: None,
            min_latency: None,
        }
    }

    /// Whether the sender announced encryption
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }
}
