//! Per-connection RAOP sessions
//!
//! A [`SessionHandler`] owns everything one sender negotiated: the stream
//! parameters, credentials, audio pipeline and the task feeding the sinks.
//! The runner drives it from the RTSP connection, the UDP packet channel and
//! a periodic tick. The bridge keeps a cloneable [`SessionHandle`] for
//! admission, packet forwarding and cancellation.

mod activity;
mod handler;
mod parameters;
mod runner;
mod state;


use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::audio::{FrameQueue, QueueStats};

pub use activity::ActivityMonitor;
pub use handler::{Flow, Handled, PacketSource, SERVER_NAME, SessionEnv, SessionHandler};
pub use parameters::{
    ParameterUpdate, SILENCE_THRESHOLD_DB, VOLUME_MAX_DB, VOLUME_MIN_DB, VolumeUpdate,
    db_to_linear, linear_to_db, parse_set_parameter, parse_volume_parameter,
    volume_response_body,
};
pub(crate) use handler::stamp;
pub use runner::SessionRunner;
pub use state::{CloseReason, SessionError, SessionState};

/// A datagram received for a session on one of its target's UDP ports
#[derive(Debug, Clone)]
pub struct InboundPacket {
    /// Port the datagram arrived on
    pub source: PacketSource,
    /// Raw datagram
    pub data: Bytes,
    /// Arrival time
    pub received_at: Instant,
}

/// Cancellation shared between a session and whoever ends it
#[derive(Debug, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    reason: Mutex<Option<CloseReason>>,
}

impl CancelSignal {
    /// Create a signal cancelled along with `parent`
    #[must_use]
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            reason: Mutex::new(None),
        }
    }

    /// Cancel, recording why; the first reason wins
    pub fn cancel(&self, reason: CloseReason) {
        self.reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(reason);
        self.token.cancel();
    }

    /// Why the session was cancelled; a parent cancellation is a shutdown
    #[must_use]
    pub fn reason(&self) -> CloseReason {
        self.reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or(CloseReason::Shutdown)
    }

    /// Token that fires on cancellation
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Id, state and frame backlog of a session at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Session id as sent in the `Session` header
    pub id: String,
    /// Lifecycle state
    pub state: SessionState,
    /// Frames waiting for the sinks, once a stream is negotiated
    pub queue: Option<QueueStats>,
}

/// Where a session publishes its frame queue once ANNOUNCE creates it
pub type QueueSlot = Arc<OnceLock<Arc<FrameQueue>>>;

/// Bridge-side handle to a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: String,
    signal: Arc<CancelSignal>,
    packets: mpsc::Sender<InboundPacket>,
    state: watch::Receiver<SessionState>,
    queue: QueueSlot,
}

/// Session-side ends of the channels behind a [`SessionHandle`]
#[derive(Debug)]
pub struct SessionInbox {
    /// Packets forwarded from the UDP listeners
    pub packets: mpsc::Receiver<InboundPacket>,
    /// State published to the handle
    pub state: watch::Sender<SessionState>,
    /// Cancellation shared with the handle
    pub signal: Arc<CancelSignal>,
    /// Frame queue shared with the handle
    pub queue: QueueSlot,
}

impl SessionHandle {
    /// Create a handle and its inbox; cancelling `parent` cancels the session
    #[must_use]
    pub fn channel(
        id: impl Into<String>,
        packet_capacity: usize,
        parent: &CancellationToken,
    ) -> (Self, SessionInbox) {
        let (packet_tx, packet_rx) = mpsc::channel(packet_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let signal = Arc::new(CancelSignal::child_of(parent));
        let queue = QueueSlot::default();

        let handle = Self {
            id: id.into(),
            signal: Arc::clone(&signal),
            packets: packet_tx,
            state: state_rx,
            queue: Arc::clone(&queue),
        };
        let inbox = SessionInbox {
            packets: packet_rx,
            state: state_tx,
            signal,
            queue,
        };
        (handle, inbox)
    }

    /// Session id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Whether the session has ended
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state().is_terminal() || self.packets.is_closed()
    }

    /// Forward a packet without waiting; returns false if it was dropped
    pub fn try_send(&self, packet: InboundPacket) -> bool {
        self.packets.try_send(packet).is_ok()
    }

    /// Ask the session to end
    pub fn cancel_with(&self, reason: CloseReason) {
        self.signal.cancel(reason);
    }

    /// Wait until the session reports `Closed`
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        // A dropped sender means the session task is gone
        let _ = state.wait_for(SessionState::is_terminal).await;
    }

    /// [`closed`](Self::closed) with a deadline; false on timeout
    pub async fn wait_closed(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.closed()).await.is_ok()
    }

    /// Id, state and queue occupancy
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            state: self.state(),
            queue: self.queue.get().map(|queue| queue.stats()),
        }
    }
}

/// Random 8-hex-digit session id
#[must_use]
pub fn new_session_id() -> String {
    format!("{:08X}", rand::random::<u32>())
}
