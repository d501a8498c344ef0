//! Per-packet audio decoders
//!
//! Each RTP payload carries a self-contained codec frame. Decoders turn one
//! payload into interleaved 16-bit samples at the sender's rate.

use thiserror::Error;

use super::format::{AudioCodec, StreamParameters};

/// Decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// No decoder available for this codec
    #[error("Unsupported codec: {0}")]
    Unsupported(AudioCodec),

    /// Payload could not be interpreted
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// Codec backend failure
    #[error("Decoder error: {0}")]
    Backend(String),
}

/// Decodes one RTP payload at a time
pub trait PacketDecoder: Send + Sync {
    /// Decode a payload into interleaved samples
    ///
    /// # Errors
    /// Returns `DecodeError` if the payload is corrupt.
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>, DecodeError>;

    /// Output channel count
    fn channels(&self) -> u8;

    /// Output sample rate
    fn sample_rate(&self) -> u32;

    /// Discard inter-packet state, after a flush or a gap
    fn reset(&mut self) {}
}

/// Big-endian 16-bit PCM (L16)
#[derive(Debug, Clone)]
pub struct PcmDecoder {
    sample_rate: u32,
    channels: u8,
}

impl PcmDecoder {
    /// Create a decoder for the given format
    #[must_use]
    pub fn new(sample_rate: u32, channels: u8) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
        }
    }
}

impl PacketDecoder for PcmDecoder {
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>, DecodeError> {
        let frame_bytes = 2 * usize::from(self.channels);
        if payload.len() % frame_bytes != 0 {
            return Err(DecodeError::Malformed(format!(
                "{} bytes is not a whole number of {}-channel frames",
                payload.len(),
                self.channels
            )));
        }

        Ok(payload
            .chunks_exact(2)
            .map(|b| i16::from_be_bytes([b[0], b[1]]))
            .collect())
    }

    fn channels(&self) -> u8 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(feature = "decoders")]
pub use alac::AlacDecoder;

#[cfg(feature = "decoders")]
mod alac {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::{CODEC_TYPE_ALAC, CodecParameters, Decoder, DecoderOptions};
    use symphonia::core::formats::Packet;

    use super::{DecodeError, PacketDecoder};
    use crate::protocol::sdp::AlacParameters;

    /// Apple Lossless decoder backed by symphonia
    pub struct AlacDecoder {
        decoder: Box<dyn Decoder>,
        sample_rate: u32,
        channels: u8,
        frames_per_packet: u32,
        packets: u64,
    }

    impl AlacDecoder {
        /// Create a decoder from the announced fmtp parameters
        ///
        /// # Errors
        /// Returns `DecodeError::Backend` if symphonia rejects the
        /// configuration.
        pub fn new(params: &AlacParameters) -> Result<Self, DecodeError> {
            let mut codec_params = CodecParameters::new();
            codec_params
                .for_codec(CODEC_TYPE_ALAC)
                .with_sample_rate(params.sample_rate)
                .with_bits_per_sample(u32::from(params.bit_depth))
                .with_max_frames_per_packet(u64::from(params.frames_per_packet))
                .with_extra_data(Box::new(params.magic_cookie()));

            let decoder = symphonia::default::get_codecs()
                .make(&codec_params, &DecoderOptions::default())
                .map_err(|e| DecodeError::Backend(e.to_string()))?;

            Ok(Self {
                decoder,
                sample_rate: params.sample_rate,
                channels: params.channels.max(1),
                frames_per_packet: params.frames_per_packet,
                packets: 0,
            })
        }
    }

    impl PacketDecoder for AlacDecoder {
        fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>, DecodeError> {
            let fpp = u64::from(self.frames_per_packet);
            let packet = Packet::new_from_slice(0, self.packets * fpp, fpp, payload);
            self.packets += 1;

            let decoded = self
                .decoder
                .decode(&packet)
                .map_err(|e| DecodeError::Malformed(e.to_string()))?;

            let spec = *decoded.spec();
            let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            samples.copy_interleaved_ref(decoded);
            Ok(samples.samples().to_vec())
        }

        fn channels(&self) -> u8 {
            self.channels
        }

        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn reset(&mut self) {
            self.decoder.reset();
        }
    }
}

/// Pick a decoder for the negotiated stream
///
/// # Errors
/// Returns `DecodeError::Unsupported` for codecs without a decoder in this
/// build.
pub fn decoder_for(params: &StreamParameters) -> Result<Box<dyn PacketDecoder>, DecodeError> {
    match params.codec {
        AudioCodec::Pcm => Ok(Box::new(PcmDecoder::new(params.sample_rate, params.channels))),
        #[cfg(feature = "decoders")]
        AudioCodec::Alac => {
            let alac = params.alac.ok_or_else(|| {
                DecodeError::Malformed("ALAC stream without fmtp parameters".to_string())
            })?;
            Ok(Box::new(AlacDecoder::new(&alac)?))
        }
        codec => Err(DecodeError::Unsupported(codec)),
    }
}
