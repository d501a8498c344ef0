//! Live sessions, at most one per target

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::target::{Target, TargetId};
use crate::config::PreemptionPolicy;
use crate::error::BridgeError;
use crate::session::{CloseReason, SessionHandle, SessionSnapshot};

/// Session table keyed by target
///
/// Admission is serialized per target, so two senders racing for the same
/// target are admitted one after the other. Targets never wait on each
/// other.
#[derive(Debug)]
pub struct SessionTable {
    sessions: Mutex<HashMap<TargetId, SessionHandle>>,
    admission: Vec<tokio::sync::Mutex<()>>,
}

impl SessionTable {
    /// Create a table for `targets` targets
    #[must_use]
    pub fn new(targets: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::with_capacity(targets)),
            admission: (0..targets).map(|_| tokio::sync::Mutex::new(())).collect(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TargetId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handle` as the target's session
    ///
    /// A live session already on the target is cancelled and the new one is
    /// registered only once the old one reports `Closed`. Taking longer than
    /// `preempt_timeout` is logged. Returns the id of the preempted session.
    ///
    /// # Errors
    /// Returns `BridgeError::ResourceExhausted` when the target is busy and
    /// the policy is [`PreemptionPolicy::Reject`].
    pub async fn admit(
        &self,
        target: &Target,
        policy: PreemptionPolicy,
        preempt_timeout: Duration,
        handle: SessionHandle,
    ) -> Result<Option<String>, BridgeError> {
        let _admission = match self.admission.get(target.id().0) {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let existing = self.active(target.id());
        let previous = match existing {
            Some(_) if policy == PreemptionPolicy::Reject => {
                return Err(BridgeError::ResourceExhausted {
                    target: target.name().to_string(),
                });
            }
            Some(previous) => {
                tracing::info!(
                    target_name = %target.name(),
                    previous = %previous.id(),
                    next = %handle.id(),
                    "Preempting session"
                );
                previous.cancel_with(CloseReason::Preempted);
                if !previous.wait_closed(preempt_timeout).await {
                    tracing::warn!(
                        target_name = %target.name(),
                        previous = %previous.id(),
                        ?preempt_timeout,
                        "Preempted session still closing"
                    );
                    previous.closed().await;
                }
                Some(previous.id().to_string())
            }
            None => None,
        };

        self.lock().insert(target.id(), handle);
        Ok(previous)
    }

    /// The target's session, unless it has closed
    #[must_use]
    pub fn active(&self, target: TargetId) -> Option<SessionHandle> {
        self.lock()
            .get(&target)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    /// Remove the target's session if it is still `id`
    pub fn remove_if(&self, target: TargetId, id: &str) -> bool {
        let mut sessions = self.lock();
        if sessions.get(&target).is_some_and(|handle| handle.id() == id) {
            sessions.remove(&target);
            true
        } else {
            false
        }
    }

    /// Cancel every session without draining
    pub fn cancel_all(&self, reason: &CloseReason) {
        for handle in self.lock().values() {
            handle.cancel_with(reason.clone());
        }
    }

    /// All registered sessions
    #[must_use]
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.lock().values().cloned().collect()
    }

    /// Id and state of the target's live session
    #[must_use]
    pub fn snapshot(&self, target: TargetId) -> Option<SessionSnapshot> {
        self.active(target).map(|handle| handle.snapshot())
    }
}
