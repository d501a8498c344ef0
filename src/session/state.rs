//! Session lifecycle states

use std::fmt;

/// Session states following the RAOP flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Connection admitted, nothing announced yet
    Idle,
    /// ANNOUNCE accepted, transport being set up
    Negotiating,
    /// RECORD received, audio flowing to the sinks
    Streaming,
    /// Ending; buffered audio is being played out
    Draining,
    /// Session over
    Closed,
}

impl SessionState {
    /// Check if transition to new state is valid
    #[must_use]
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::{Closed, Draining, Idle, Negotiating, Streaming};

        matches!(
            (self, next),
            (Idle, Negotiating)
                | (Negotiating, Streaming)
                | (Streaming, Draining)
                | (Idle | Negotiating | Streaming | Draining, Closed)
        )
    }

    /// Whether the session has ended
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    /// Whether audio packets are accepted
    #[must_use]
    pub fn accepts_audio(&self) -> bool {
        matches!(self, SessionState::Streaming)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Negotiating => "negotiating",
            SessionState::Streaming => "streaming",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Session errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// State transition is not allowed
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: SessionState,
        /// Requested state
        to: SessionState,
    },
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Sender sent TEARDOWN
    Teardown,
    /// Sender closed the connection
    ConnectionLost,
    /// No traffic within the session timeout
    Timeout,
    /// A newer sender took over the target
    Preempted,
    /// Bridge shut down
    Shutdown,
    /// Handshake failed
    AuthFailed(String),
    /// Unrecoverable protocol or I/O error
    Error(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Teardown => write!(f, "teardown"),
            CloseReason::ConnectionLost => write!(f, "connection lost"),
            CloseReason::Timeout => write!(f, "inactivity timeout"),
            CloseReason::Preempted => write!(f, "preempted"),
            CloseReason::Shutdown => write!(f, "bridge stopped"),
            CloseReason::AuthFailed(reason) => write!(f, "authentication failed: {reason}"),
            CloseReason::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}
