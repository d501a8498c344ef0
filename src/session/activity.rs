//! Debounced inactivity detection

use std::time::{Duration, Instant};

/// Tracks the last RTSP or RTP activity of a session
///
/// A session is considered idle only after `confirmations` consecutive
/// checks have each found it past the timeout, so a single late tick does
/// not end a session.
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    timeout: Duration,
    confirmations: u32,
    last_activity: Instant,
    strikes: u32,
}

impl ActivityMonitor {
    /// Create a monitor, counting `now` as activity
    #[must_use]
    pub fn new(timeout: Duration, confirmations: u32, now: Instant) -> Self {
        Self {
            timeout,
            confirmations: confirmations.max(1),
            last_activity: now,
            strikes: 0,
        }
    }

    /// Record activity
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = self.last_activity.max(now);
        self.strikes = 0;
    }

    /// Time since the last activity
    #[must_use]
    pub fn idle_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Check for expiry; returns true once the timeout is confirmed
    pub fn check(&mut self, now: Instant) -> bool {
        if self.idle_time(now) < self.timeout {
            self.strikes = 0;
            return false;
        }
        self.strikes += 1;
        self.strikes >= self.confirmations
    }

    /// Interval between checks that confirms a timeout within roughly
    /// one extra timeout period
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        (self.timeout / self.confirmations.saturating_add(1)).max(Duration::from_millis(10))
    }
}
