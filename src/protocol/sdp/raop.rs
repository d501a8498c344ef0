//! RAOP-specific SDP parsing
//!
//! Extracts audio format and encryption parameters from the ANNOUNCE body.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use super::{MediaDescription, SdpParseError, SessionDescription};
use crate::audio::{AudioCodec, StreamParameters};
use crate::protocol::rtp::constants;

/// ALAC format parameters from the fmtp line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlacParameters {
    /// Frames per packet
    pub frames_per_packet: u32,
    /// Compatible version
    pub compatible_version: u8,
    /// Bits per sample
    pub bit_depth: u8,
    /// Rice history mult
    pub pb: u8,
    /// Rice initial history
    pub mb: u8,
    /// Rice limit
    pub kb: u8,
    /// Number of channels
    pub channels: u8,
    /// Max run
    pub max_run: u16,
    /// Max frame bytes
    pub max_frame_bytes: u32,
    /// Average bit rate
    pub avg_bit_rate: u32,
    /// Sample rate
    pub sample_rate: u32,
}

impl AlacParameters {
    /// Size of the ALAC magic cookie
    pub const COOKIE_SIZE: usize = 24;

    /// Parse from fmtp attribute value
    /// Format: "96 352 0 16 40 10 14 2 255 0 0 44100"
    ///
    /// # Errors
    /// Returns `SdpParseError` if the field count is wrong or a field is not
    /// numeric.
    pub fn parse(fmtp: &str) -> Result<Self, SdpParseError> {
        fn field<T: std::str::FromStr>(fields: &[&str], i: usize) -> Result<T, SdpParseError> {
            fields[i].parse().map_err(|_| {
                SdpParseError::InvalidAttribute(format!("ALAC fmtp field {i}: {}", fields[i]))
            })
        }

        let parts: Vec<&str> = fmtp.split_whitespace().collect();

        // The payload type prefix is optional
        let fields = match parts.len() {
            12 => &parts[1..],
            11 => &parts[..],
            n => {
                return Err(SdpParseError::InvalidAttribute(format!(
                    "ALAC fmtp needs 11 or 12 fields, got {n}: {fmtp}"
                )));
            }
        };

        Ok(AlacParameters {
            frames_per_packet: field(fields, 0)?,
            compatible_version: field(fields, 1)?,
            bit_depth: field(fields, 2)?,
            pb: field(fields, 3)?,
            mb: field(fields, 4)?,
            kb: field(fields, 5)?,
            channels: field(fields, 6)?,
            max_run: field(fields, 7)?,
            max_frame_bytes: field(fields, 8)?,
            avg_bit_rate: field(fields, 9)?,
            sample_rate: field(fields, 10)?,
        })
    }

    /// ALAC decoder configuration ("magic cookie") for these parameters
    #[must_use]
    pub fn magic_cookie(&self) -> [u8; Self::COOKIE_SIZE] {
        let mut cookie = [0u8; Self::COOKIE_SIZE];
        cookie[0..4].copy_from_slice(&self.frames_per_packet.to_be_bytes());
        cookie[4] = self.compatible_version;
        cookie[5] = self.bit_depth;
        cookie[6] = self.pb;
        cookie[7] = self.mb;
        cookie[8] = self.kb;
        cookie[9] = self.channels;
        cookie[10..12].copy_from_slice(&self.max_run.to_be_bytes());
        cookie[12..16].copy_from_slice(&self.max_frame_bytes.to_be_bytes());
        cookie[16..20].copy_from_slice(&self.avg_bit_rate.to_be_bytes());
        cookie[20..24].copy_from_slice(&self.sample_rate.to_be_bytes());
        cookie
    }
}

/// Encryption parameters from SDP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionParams {
    /// RSA-encrypted AES key (base64-decoded)
    pub encrypted_aes_key: Vec<u8>,
    /// AES IV (base64-decoded)
    pub aes_iv: [u8; 16],
}

/// Decode base64 that may omit its padding, as RAOP senders do
fn decode_base64(value: &str) -> Option<Vec<u8>> {
    let trimmed = value.trim().trim_end_matches('=');
    let mut padded = trimmed.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    BASE64.decode(padded).ok()
}

/// Parse encryption parameters from SDP attributes
///
/// # Errors
/// Returns `SdpParseError` if `aesiv` is missing or either value is not
/// valid base64.
pub fn parse_encryption(sdp: &SessionDescription) -> Result<Option<EncryptionParams>, SdpParseError> {
    let Some(encrypted_key) = sdp.rsaaeskey() else {
        return Ok(None);
    };

    let iv_str = sdp.aesiv().ok_or(SdpParseError::MissingField("aesiv"))?;

    let encrypted_aes_key = decode_base64(encrypted_key)
        .ok_or_else(|| SdpParseError::InvalidAttribute("Invalid base64 in rsaaeskey".into()))?;

    let iv_bytes = decode_base64(iv_str)
        .ok_or_else(|| SdpParseError::InvalidAttribute("Invalid base64 in aesiv".into()))?;

    let aes_iv: [u8; 16] = iv_bytes.as_slice().try_into().map_err(|_| {
        SdpParseError::InvalidAttribute(format!(
            "AES IV must be 16 bytes, got {}",
            iv_bytes.len()
        ))
    })?;

    Ok(Some(EncryptionParams {
        encrypted_aes_key,
        aes_iv,
    }))
}

/// Detect codec from the rtpmap attribute
#[must_use]
pub fn detect_codec(media: &MediaDescription) -> Option<AudioCodec> {
    let rtpmap = media.get_attribute("rtpmap")?;

    if rtpmap.contains("AppleLossless") {
        Some(AudioCodec::Alac)
    } else if rtpmap.contains("mpeg4-generic") || rtpmap.contains("MP4A-LATM") {
        let eld = media
            .get_attribute("fmtp")
            .is_some_and(|f| f.to_ascii_lowercase().contains("aac-eld"));
        if eld || rtpmap.contains("ELD") {
            Some(AudioCodec::AacEld)
        } else {
            Some(AudioCodec::AacLc)
        }
    } else if rtpmap.contains("L16") {
        Some(AudioCodec::Pcm)
    } else {
        None
    }
}

/// Rate and channel count from an rtpmap like `96 L16/44100/2`
fn rtpmap_format(rtpmap: &str) -> (Option<u32>, Option<u8>) {
    let encoding = rtpmap.split_whitespace().nth(1).unwrap_or_default();
    let mut parts = encoding.split('/').skip(1);
    let rate = parts.next().and_then(|r| r.parse().ok());
    let channels = parts.next().and_then(|c| c.parse().ok());
    (rate, channels)
}

/// Extract stream parameters from an ANNOUNCE session description
///
/// # Errors
/// Returns `SdpParseError` if the audio media, rtpmap, or (for ALAC) fmtp
/// is missing or invalid.
pub fn extract_stream_parameters(sdp: &SessionDescription) -> Result<StreamParameters, SdpParseError> {
    let media = sdp
        .audio_media()
        .ok_or(SdpParseError::MissingField("audio media"))?;

    let codec = detect_codec(media).ok_or(SdpParseError::MissingField("rtpmap"))?;
    let (map_rate, map_channels) = rtpmap_format(media.get_attribute("rtpmap").unwrap_or_default());

    let alac = match codec {
        AudioCodec::Alac => {
            let fmtp = media
                .get_attribute("fmtp")
                .ok_or(SdpParseError::MissingField("fmtp"))?;
            Some(AlacParameters::parse(fmtp)?)
        }
        AudioCodec::Pcm | AudioCodec::AacLc | AudioCodec::AacEld => None,
    };

    let (sample_rate, bits_per_sample, channels, frames_per_packet) = match alac {
        Some(alac) => (
            alac.sample_rate,
            alac.bit_depth,
            alac.channels,
            alac.frames_per_packet,
        ),
        None => (
            map_rate.unwrap_or(constants::SAMPLE_RATE),
            16,
            map_channels.unwrap_or(constants::CHANNELS),
            constants::FRAMES_PER_PACKET,
        ),
    };

    if sample_rate == 0 || channels == 0 || frames_per_packet == 0 {
        return Err(SdpParseError::InvalidAttribute(format!(
            "degenerate stream format: {sample_rate} Hz, {channels} channels, {frames_per_packet} frames/packet"
        )));
    }

    let min_latency = sdp
        .audio_attribute("min-latency")
        .and_then(|s| s.trim().parse().ok());

    Ok(StreamParameters {
        codec,
        sample_rate,
        bits_per_sample,
        channels,
        frames_per_packet,
        alac,
        encryption: parse_encryption(sdp)?,
        min_latency,
    })
}
