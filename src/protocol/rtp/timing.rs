use super::packet::{PayloadType, RtpDecodeError};

/// NTP timestamp (64-bit, seconds since 1900-01-01)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NtpTimestamp {
    /// Seconds since NTP epoch
    pub seconds: u32,
    /// Fractional seconds (1/2^32 of a second)
    pub fraction: u32,
}

impl NtpTimestamp {
    /// NTP epoch offset from Unix epoch (70 years in seconds)
    const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

    /// Create from current time
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "NTP seconds wrap at 32 bits by definition"
    )]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};

        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        let ntp_secs = duration.as_secs() + Self::NTP_UNIX_OFFSET;
        let fraction = (u64::from(duration.subsec_nanos()) << 32) / 1_000_000_000;

        Self {
            seconds: ntp_secs as u32,
            fraction: fraction as u32,
        }
    }

    /// Encode to 8 bytes
    #[must_use]
    pub fn encode(&self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&self.seconds.to_be_bytes());
        buf[4..8].copy_from_slice(&self.fraction.to_be_bytes());
        buf
    }

    /// Decode from the first 8 bytes of `buf`
    ///
    /// Callers check the length; short input decodes as zero.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Self {
        let Some(bytes) = buf.get(..8) else {
            return Self::default();
        };
        Self {
            seconds: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            fraction: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

/// Timing request sent by the sender to the timing port
///
/// Layout: 8-byte header, then reference, receive and send timestamps.
#[derive(Debug, Clone, Copy)]
pub struct TimingRequest {
    /// Header sequence field
    pub sequence: u16,
    /// Reference timestamp
    pub reference_time: NtpTimestamp,
    /// Receive timestamp (zero in requests)
    pub receive_time: NtpTimestamp,
    /// Time the sender sent the request
    pub send_time: NtpTimestamp,
}

impl TimingRequest {
    /// Packet size
    pub const SIZE: usize = 32;

    /// Create a request stamped with the current time
    #[must_use]
    pub fn new(sequence: u16) -> Self {
        let now = NtpTimestamp::now();
        Self {
            sequence,
            reference_time: now,
            receive_time: NtpTimestamp::default(),
            send_time: now,
        }
    }

    /// Encode to bytes
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        encode_timing(
            PayloadType::TimingRequest,
            self.sequence,
            [self.reference_time, self.receive_time, self.send_time],
        )
    }

    /// Decode from bytes
    ///
    /// # Errors
    /// Returns `RtpDecodeError` for short buffers or a wrong payload type.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        let [reference_time, receive_time, send_time] =
            decode_timing(buf, PayloadType::TimingRequest)?;
        Ok(Self {
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            reference_time,
            receive_time,
            send_time,
        })
    }
}

/// Timing response sent back by the receiver
#[derive(Debug, Clone, Copy)]
pub struct TimingResponse {
    /// Header sequence field, echoed from the request
    pub sequence: u16,
    /// The request's send time
    pub reference_time: NtpTimestamp,
    /// Time the receiver got the request
    pub receive_time: NtpTimestamp,
    /// Time the receiver sent the response
    pub send_time: NtpTimestamp,
}

impl TimingResponse {
    /// Build the reply to `request`
    #[must_use]
    pub fn reply_to(request: &TimingRequest, received_at: NtpTimestamp) -> Self {
        Self {
            sequence: request.sequence,
            reference_time: request.send_time,
            receive_time: received_at,
            send_time: NtpTimestamp::now(),
        }
    }

    /// Encode to bytes
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        encode_timing(
            PayloadType::TimingResponse,
            self.sequence,
            [self.reference_time, self.receive_time, self.send_time],
        )
    }

    /// Decode from bytes
    ///
    /// # Errors
    /// Returns `RtpDecodeError` for short buffers or a wrong payload type.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        let [reference_time, receive_time, send_time] =
            decode_timing(buf, PayloadType::TimingResponse)?;
        Ok(Self {
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            reference_time,
            receive_time,
            send_time,
        })
    }
}

fn encode_timing(payload_type: PayloadType, sequence: u16, stamps: [NtpTimestamp; 3]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TimingRequest::SIZE);
    buf.push(0x80);
    buf.push(0x80 | payload_type as u8);
    buf.extend_from_slice(&sequence.to_be_bytes());
    buf.extend_from_slice(&[0u8; 4]);
    for stamp in stamps {
        buf.extend_from_slice(&stamp.encode());
    }
    buf
}

fn decode_timing(
    buf: &[u8],
    expected: PayloadType,
) -> Result<[NtpTimestamp; 3], RtpDecodeError> {
    if buf.len() < TimingRequest::SIZE {
        return Err(RtpDecodeError::BufferTooSmall {
            needed: TimingRequest::SIZE,
            have: buf.len(),
        });
    }
    let payload_type = buf[1] & 0x7F;
    if payload_type != expected as u8 {
        return Err(RtpDecodeError::UnknownPayloadType(payload_type));
    }
    Ok([
        NtpTimestamp::decode(&buf[8..16]),
        NtpTimestamp::decode(&buf[16..24]),
        NtpTimestamp::decode(&buf[24..32]),
    ])
}
