use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// RTP payload types seen on RAOP sockets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadType {
    /// Timing request
    TimingRequest = 0x52,
    /// Timing response
    TimingResponse = 0x53,
    /// Sync (RTP time to NTP time anchor)
    Sync = 0x54,
    /// Retransmit request
    RetransmitRequest = 0x55,
    /// Retransmit response
    RetransmitResponse = 0x56,
    /// Audio data (realtime)
    AudioRealtime = 0x60,
    /// Audio data (buffered)
    AudioBuffered = 0x61,
}

impl PayloadType {
    /// Whether this payload type carries audio
    #[must_use]
    pub fn is_audio(self) -> bool {
        matches!(self, Self::AudioRealtime | Self::AudioBuffered)
    }

    /// Parse from the second header byte; the marker bit is ignored
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b & 0x7F {
            0x52 => Self::TimingRequest,
            0x53 => Self::TimingResponse,
            0x54 => Self::Sync,
            0x55 => Self::RetransmitRequest,
            0x56 => Self::RetransmitResponse,
            0x60 => Self::AudioRealtime,
            0x61 => Self::AudioBuffered,
            _ => return None,
        })
    }
}

/// Fixed part of an RTP header
///
/// CSRC lists, header extensions and padding are consumed while decoding
/// and never kept: RAOP senders do not use them for anything the receiver
/// needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Marker bit (set on the first packet after a flush)
    pub marker: bool,
    /// Payload type
    pub payload_type: PayloadType,
    /// Sequence number
    pub sequence: u16,
    /// Timestamp in sender samples
    pub timestamp: u32,
    /// Synchronization source
    pub ssrc: u32,
}

impl RtpHeader {
    /// Fixed header size
    pub const SIZE: usize = 12;

    const VERSION: u8 = 2;

    /// Header for an audio packet
    #[must_use]
    pub fn new_audio(sequence: u16, timestamp: u32, ssrc: u32, buffered: bool) -> Self {
        Self {
            marker: true,
            payload_type: if buffered {
                PayloadType::AudioBuffered
            } else {
                PayloadType::AudioRealtime
            },
            sequence,
            timestamp,
            ssrc,
        }
    }

    /// Encode header to bytes
    #[must_use]
    pub fn encode(&self) -> [u8; 12] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = Self::VERSION << 6;
        buf[1] = (u8::from(self.marker) << 7) | self.payload_type as u8;
        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
        buf
    }
}

/// RTP decode errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RtpDecodeError {
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    #[error("invalid RTP version: {0}")]
    InvalidVersion(u8),

    #[error("unknown payload type: 0x{0:02x}")]
    UnknownPayloadType(u8),
}

fn need(buf: &[u8], needed: usize) -> Result<(), RtpDecodeError> {
    if buf.len() < needed {
        return Err(RtpDecodeError::BufferTooSmall {
            needed,
            have: buf.len(),
        });
    }
    Ok(())
}

/// RTP packet with its payload
#[derive(Debug, Clone)]
pub struct RtpPacket {
    /// Packet header
    pub header: RtpHeader,
    /// Payload, still encrypted when the stream is
    pub payload: Bytes,
}

impl RtpPacket {
    /// Create an audio packet
    #[must_use]
    pub fn audio(
        sequence: u16,
        timestamp: u32,
        ssrc: u32,
        payload: impl Into<Bytes>,
        buffered: bool,
    ) -> Self {
        Self {
            header: RtpHeader::new_audio(sequence, timestamp, ssrc, buffered),
            payload: payload.into(),
        }
    }

    /// Encode packet to bytes
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(RtpHeader::SIZE + self.payload.len());
        buf.put_slice(&self.header.encode());
        buf.put_slice(&self.payload);
        buf.to_vec()
    }

    /// Decode packet from bytes
    ///
    /// # Errors
    ///
    /// Returns `RtpDecodeError` if the buffer is truncated, the version is
    /// not 2, or the payload type is not a RAOP one.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        need(buf, RtpHeader::SIZE)?;

        let version = buf[0] >> 6;
        if version != RtpHeader::VERSION {
            return Err(RtpDecodeError::InvalidVersion(version));
        }
        let padded = buf[0] & 0x20 != 0;
        let extended = buf[0] & 0x10 != 0;
        let csrc_count = usize::from(buf[0] & 0x0F);

        let payload_type = PayloadType::from_byte(buf[1])
            .ok_or(RtpDecodeError::UnknownPayloadType(buf[1] & 0x7F))?;

        let header = RtpHeader {
            marker: buf[1] & 0x80 != 0,
            payload_type,
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        };

        let mut start = RtpHeader::SIZE + 4 * csrc_count;
        if extended {
            need(buf, start + 4)?;
            let words = u16::from_be_bytes([buf[start + 2], buf[start + 3]]);
            start += 4 + 4 * usize::from(words);
        }

        let mut end = buf.len();
        if padded {
            end = end.saturating_sub(usize::from(buf[end - 1]));
        }
        if start > end {
            return Err(RtpDecodeError::BufferTooSmall {
                needed: start,
                have: end,
            });
        }

        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(&buf[start..end]),
        })
    }
}
