use std::io;

use thiserror::Error;

use crate::audio::DecodeError;
use crate::protocol::rtp::RtpDecodeError;

/// Invalid bridge configuration, detected before any session exists
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// At least one target is required
    #[error("no targets configured")]
    NoTargets,

    /// Output sample rate must be positive
    #[error("invalid output sample rate: {0}")]
    InvalidSampleRate(u32),

    /// Port base of zero cannot be bound deterministically
    #[error("invalid port base: {0}")]
    InvalidPortBase(u16),

    /// The derived port range ran past 65535
    #[error("ports for target {index} overflow the port space (base {base})")]
    PortOverflow {
        /// Target index
        index: usize,
        /// Configured port base
        base: u16,
    },

    /// Two targets were assigned overlapping port ranges
    #[error("port ranges of targets {first} and {second} collide")]
    PortCollision {
        /// First target index
        first: usize,
        /// Second target index
        second: usize,
    },

    /// A listener could not be bound at startup
    #[error("failed to bind {protocol} port {port} for target '{target}': {source}")]
    Bind {
        /// Target name
        target: String,
        /// Port that failed
        port: u16,
        /// "tcp" or "udp"
        protocol: &'static str,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },
}

/// Handshake could not produce session credentials
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// Handshake request was malformed
    #[error("malformed handshake: {0}")]
    Malformed(String),

    /// Sender asked for something this receiver cannot do
    #[error("unsupported capability: {0}")]
    Unsupported(String),

    /// Authenticator refused the sender
    #[error("handshake rejected: {0}")]
    Rejected(String),
}

/// Per-packet transport problem; the packet is dropped
#[derive(Debug, Error)]
pub enum TransportError {
    /// RTP header could not be decoded
    #[error("invalid RTP packet: {0}")]
    Rtp(#[from] RtpDecodeError),

    /// Packet arrived after its slot was played or skipped
    #[error("late packet {sequence} (expected {expected})")]
    TooLate {
        /// Sequence number received
        sequence: u16,
        /// Next sequence the buffer expected
        expected: u16,
    },

    /// Packet already buffered
    #[error("duplicate packet {0}")]
    Duplicate(u16),

    /// Payload type not valid on this channel
    #[error("unexpected payload type 0x{0:02x}")]
    UnexpectedPayload(u8),

    /// Payload could not be decrypted
    #[error("decryption failed: {0}")]
    Decrypt(String),

    /// Payload could not be decoded; silence was substituted
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Audio arrived while the session was not streaming
    #[error("audio packet received outside streaming state")]
    NotStreaming,
}

/// Kind of sink a failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Media player (URL / transport commands)
    MediaPlayer,
    /// Raw PCM speaker
    Speaker,
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkKind::MediaPlayer => write!(f, "media player"),
            SinkKind::Speaker => write!(f, "speaker"),
        }
    }
}

/// Sink refused or failed an operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// A specific sink failed
    #[error("{sink} unavailable: {message}")]
    Unavailable {
        /// Which sink failed
        sink: SinkKind,
        /// Description from the sink
        message: String,
    },

    /// Neither sink could take the frame
    #[error("no sink available")]
    NoSinkAvailable,
}

impl SinkError {
    /// Shorthand for a failed media player
    pub fn player(message: impl Into<String>) -> Self {
        SinkError::Unavailable {
            sink: SinkKind::MediaPlayer,
            message: message.into(),
        }
    }

    /// Shorthand for a failed speaker
    pub fn speaker(message: impl Into<String>) -> Self {
        SinkError::Unavailable {
            sink: SinkKind::Speaker,
            message: message.into(),
        }
    }
}

/// Top-level bridge error
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration problem, fatal at startup
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Session negotiation failed
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthFailure),

    /// Transport-level packet error
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Sink failure
    #[error("sink error: {0}")]
    SinkUnavailable(#[from] SinkError),

    /// Target slot already taken and preemption is disabled
    #[error("target '{target}' is busy")]
    ResourceExhausted {
        /// Target name
        target: String,
    },

    /// `start()` called twice
    #[error("bridge is already running")]
    AlreadyRunning,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BridgeError {
    /// Whether the bridge as a whole cannot continue
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::Configuration(_))
    }

    /// Whether the error only affects a single session
    #[must_use]
    pub fn is_session_scoped(&self) -> bool {
        matches!(
            self,
            BridgeError::Auth(_)
                | BridgeError::Transport(_)
                | BridgeError::SinkUnavailable(_)
                | BridgeError::ResourceExhausted { .. }
        )
    }
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_fatal() {
        let err = BridgeError::from(ConfigurationError::NoTargets);
        assert!(err.is_fatal());
        assert!(!err.is_session_scoped());
    }

    #[test]
    fn test_session_errors_are_scoped() {
        let auth = BridgeError::from(AuthFailure::Rejected("nope".into()));
        assert!(auth.is_session_scoped());
        assert!(!auth.is_fatal());

        let busy = BridgeError::ResourceExhausted {
            target: "Kitchen".into(),
        };
        assert!(busy.is_session_scoped());
        assert_eq!(busy.to_string(), "target 'Kitchen' is busy");
    }

    #[test]
    fn test_sink_error_display() {
        let err = SinkError::speaker("device gone");
        assert_eq!(err.to_string(), "speaker unavailable: device gone");
        assert_eq!(
            SinkError::player("offline").to_string(),
            "media player unavailable: offline"
        );
    }

    #[test]
    fn test_bind_error_keeps_source() {
        use std::error::Error as _;

        let err = ConfigurationError::Bind {
            target: "Den".into(),
            port: 7000,
            protocol: "tcp",
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("tcp port 7000"));
    }
}
