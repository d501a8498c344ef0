//! Multi-target RAOP bridge
//!
//! A [`Bridge`] owns a fixed set of relay targets. Each target is an
//! independent receiver endpoint on its own ports with at most one active
//! session; a new sender preempts the previous one unless the policy says
//! otherwise.

mod events;
mod listener;
mod table;
mod target;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub use events::BridgeEvent;
pub use listener::{TargetContext, TargetSockets};
pub use table::SessionTable;
pub use target::{Target, TargetId, TargetInfo};

use crate::auth::SessionAuthenticator;
use crate::config::{BridgeConfig, BridgeSettings};
use crate::error::{BridgeError, ConfigurationError};
use crate::ports::PortAllocator;
use crate::session::{CloseReason, SessionEnv, SessionSnapshot, SessionState};

const EVENT_CAPACITY: usize = 64;

const STATE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Bridge lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Not listening
    Stopped,
    /// Binding ports
    Starting,
    /// Listening on every target
    Running,
    /// Shutting down
    Stopping,
}

struct Running {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

/// Multi-target AirPlay bridge
pub struct Bridge {
    settings: Arc<BridgeSettings>,
    targets: Vec<Arc<Target>>,
    authenticator: Arc<dyn SessionAuthenticator>,
    events: broadcast::Sender<BridgeEvent>,
    sessions: Arc<SessionTable>,
    state: watch::Sender<BridgeState>,
    running: Mutex<Option<Running>>,
}

impl Bridge {
    /// Validate the configuration and build the targets
    ///
    /// # Errors
    /// Returns `ConfigurationError` for an invalid configuration or port
    /// layout.
    pub fn new(
        config: BridgeConfig,
        authenticator: Arc<dyn SessionAuthenticator>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;

        let BridgeConfig { settings, targets } = config;
        let ports = PortAllocator::new(settings.port_base).assign_all(targets.len())?;

        let targets: Vec<Arc<Target>> = targets
            .into_iter()
            .zip(ports)
            .enumerate()
            .map(|(index, (target, ports))| {
                Arc::new(Target::new(TargetId(index), target, &settings, ports))
            })
            .collect();

        log_configuration(&settings, &targets);

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state, _) = watch::channel(BridgeState::Stopped);

        Ok(Self {
            sessions: Arc::new(SessionTable::new(targets.len())),
            settings: Arc::new(settings),
            targets,
            authenticator,
            events,
            state,
            running: Mutex::new(None),
        })
    }

    /// Bind every target and start serving
    ///
    /// # Errors
    /// Returns `BridgeError::AlreadyRunning` if already started, or a
    /// `ConfigurationError::Bind` if any port cannot be bound. On a bind
    /// failure nothing stays bound and the bridge remains stopped.
    pub async fn start(&self) -> Result<(), BridgeError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(BridgeError::AlreadyRunning);
        }
        self.state.send_replace(BridgeState::Starting);

        let mut bound = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            match TargetSockets::bind(target, self.settings.bind_address).await {
                Ok(sockets) => bound.push((Arc::clone(target), sockets)),
                Err(e) => {
                    tracing::error!("Failed to start bridge: {}", e);
                    drop(bound);
                    self.state.send_replace(BridgeState::Stopped);
                    return Err(e.into());
                }
            }
        }

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        for (target, sockets) in bound {
            let ctx = TargetContext {
                env: SessionEnv {
                    target,
                    settings: Arc::clone(&self.settings),
                    authenticator: Arc::clone(&self.authenticator),
                    events: self.events.clone(),
                },
                sessions: Arc::clone(&self.sessions),
                cancel: cancel.clone(),
                tracker: tracker.clone(),
            };
            listener::spawn_target(sockets, &ctx);
        }

        *running = Some(Running { cancel, tracker });
        self.state.send_replace(BridgeState::Running);
        tracing::info!(targets = self.targets.len(), "Bridge started");
        let _ = self.events.send(BridgeEvent::Started {
            targets: self.targets.len(),
        });
        Ok(())
    }

    /// Stop serving
    ///
    /// Sessions are cancelled without draining. Returns once every task has
    /// finished and every port is released. Stopping a stopped bridge does
    /// nothing.
    pub async fn stop(&self) {
        let Some(Running { cancel, tracker }) = self.running.lock().await.take() else {
            return;
        };
        self.state.send_replace(BridgeState::Stopping);

        self.sessions.cancel_all(&CloseReason::Shutdown);
        cancel.cancel();
        tracker.close();
        tracker.wait().await;

        self.state.send_replace(BridgeState::Stopped);
        tracing::info!("Bridge stopped");
        let _ = self.events.send(BridgeEvent::Stopped);
    }

    /// Configured targets
    #[must_use]
    pub fn targets(&self) -> Vec<TargetInfo> {
        self.targets.iter().map(|t| TargetInfo::from(t.as_ref())).collect()
    }

    /// Scalar settings in effect
    #[must_use]
    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Lifecycle state
    #[must_use]
    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    /// Subscribe to bridge events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// The target's live session, if any
    #[must_use]
    pub fn session(&self, target: TargetId) -> Option<SessionSnapshot> {
        self.sessions.snapshot(target)
    }

    /// Wait until the target's session is in `state`
    ///
    /// `SessionState::Closed` is also satisfied by the target having no
    /// session. Returns false on timeout.
    pub async fn wait_for_state(
        &self,
        target: TargetId,
        state: SessionState,
        timeout: Duration,
    ) -> bool {
        let reached = || match self.session(target) {
            Some(snapshot) => snapshot.state == state,
            None => state == SessionState::Closed,
        };

        tokio::time::timeout(timeout, async {
            while !reached() {
                tokio::time::sleep(STATE_POLL_INTERVAL).await;
            }
        })
        .await
        .is_ok()
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("settings", &self.settings)
            .field("targets", &self.targets)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn log_configuration(settings: &BridgeSettings, targets: &[Arc<Target>]) {
    tracing::info!(
        device_name = %settings.device_name,
        bind_address = %settings.bind_address,
        port_base = settings.port_base,
        output_sample_rate = settings.output_sample_rate,
        media_url_template = %settings.media_url_template,
        session_timeout = ?settings.session_timeout,
        preemption = ?settings.preemption,
        targets = targets.len(),
        "Bridge configuration"
    );
    for target in targets {
        let ports = target.ports();
        tracing::info!(
            id = %target.id(),
            name = %target.name(),
            control_port = ports.control_port,
            timing_port = ports.timing_port,
            data_port = ports.data_port,
            speaker = target.speaker().is_some(),
            "Target"
        );
    }
}
