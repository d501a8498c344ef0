//! Bridge events for application integration

use super::target::TargetId;
use crate::error::SinkError;
use crate::protocol::dmap::TrackMetadata;
use crate::session::{CloseReason, SessionState};

/// Events emitted by the bridge
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// All listeners bound
    Started {
        /// Number of targets
        targets: usize,
    },

    /// Bridge stopped and every port released
    Stopped,

    /// A sender was admitted on a target
    SessionStarted {
        /// Target
        target: TargetId,
        /// New session id
        session: String,
        /// Sender address
        peer: std::net::SocketAddr,
    },

    /// A session changed state
    SessionStateChanged {
        /// Target
        target: TargetId,
        /// Session id
        session: String,
        /// New state
        state: SessionState,
    },

    /// A session ended
    SessionEnded {
        /// Target
        target: TargetId,
        /// Session id
        session: String,
        /// Why it ended
        reason: CloseReason,
    },

    /// A newer sender replaced an active session
    SessionPreempted {
        /// Target
        target: TargetId,
        /// Replaced session id
        previous: String,
    },

    /// A sender was turned away because the target was busy
    SessionRejected {
        /// Target
        target: TargetId,
        /// Sender address
        peer: std::net::SocketAddr,
    },

    /// Handshake failed
    AuthFailed {
        /// Target
        target: TargetId,
        /// Failure description
        reason: String,
    },

    /// A sink refused audio or commands
    SinkUnavailable {
        /// Target
        target: TargetId,
        /// The failure
        error: SinkError,
    },

    /// Volume changed
    VolumeChanged {
        /// Target
        target: TargetId,
        /// Volume in dB (-144 to 0)
        db: f32,
        /// Linear volume (0.0 to 1.0)
        linear: f32,
    },

    /// Track metadata updated
    MetadataUpdated {
        /// Target
        target: TargetId,
        /// New metadata
        metadata: TrackMetadata,
    },
}
