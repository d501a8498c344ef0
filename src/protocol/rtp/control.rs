use super::packet::{PayloadType, RtpDecodeError, RtpPacket};
use super::timing::NtpTimestamp;

/// Sync packet anchoring RTP time to the sender's NTP clock
#[derive(Debug, Clone, Copy)]
pub struct SyncPacket {
    /// RTP timestamp currently playing, minus latency
    pub rtp_timestamp: u32,
    /// Sender clock at that moment
    pub ntp_timestamp: NtpTimestamp,
    /// RTP timestamp of the next packet to be sent
    pub next_timestamp: u32,
}

/// Packets received on the RTP control channel
#[derive(Debug, Clone)]
pub enum ControlPacket {
    /// Clock sync
    Sync(SyncPacket),
    /// Resent audio packet, wrapped behind a 4-byte prefix
    RetransmitResponse(RtpPacket),
}

impl ControlPacket {
    /// Parse control packet from bytes
    ///
    /// # Errors
    /// Returns `RtpDecodeError` for short buffers or payload types that do
    /// not belong on the control channel.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        if buf.len() < 4 {
            return Err(RtpDecodeError::BufferTooSmall {
                needed: 4,
                have: buf.len(),
            });
        }

        let payload_type = buf[1] & 0x7F;
        match PayloadType::from_byte(payload_type) {
            Some(PayloadType::Sync) => {
                if buf.len() < 20 {
                    return Err(RtpDecodeError::BufferTooSmall {
                        needed: 20,
                        have: buf.len(),
                    });
                }
                Ok(ControlPacket::Sync(SyncPacket {
                    rtp_timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
                    ntp_timestamp: NtpTimestamp::decode(&buf[8..16]),
                    next_timestamp: u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]),
                }))
            }
            Some(PayloadType::RetransmitResponse) => {
                let inner = RtpPacket::decode(&buf[4..])?;
                Ok(ControlPacket::RetransmitResponse(inner))
            }
            _ => Err(RtpDecodeError::UnknownPayloadType(payload_type)),
        }
    }

    /// Encode a retransmit response around an audio packet
    #[must_use]
    pub fn encode_retransmit(packet: &RtpPacket) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + 12 + packet.payload.len());
        buf.push(0x80);
        buf.push(0x80 | PayloadType::RetransmitResponse as u8);
        buf.extend_from_slice(&packet.header.sequence.to_be_bytes());
        buf.extend_from_slice(&packet.encode());
        buf
    }
}
