//! Rate limiting for repeated warnings
//!
//! A lossy network can produce a decode or sequence warning per packet.
//! Hot paths log through a [`DiagnosticThrottle`] so at most one line per
//! interval is emitted, carrying the number of suppressed occurrences.

use std::time::{Duration, Instant};

/// Default interval between repeated warnings
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Allows one report per interval
#[derive(Debug, Clone)]
pub struct DiagnosticThrottle {
    interval: Duration,
    last: Option<Instant>,
    suppressed: u64,
}

impl DiagnosticThrottle {
    /// Create a throttle
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            suppressed: 0,
        }
    }

    /// Record an occurrence
    ///
    /// Returns `Some(suppressed)` when this occurrence should be logged,
    /// with the count of occurrences swallowed since the last report.
    pub fn check(&mut self, now: Instant) -> Option<u64> {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => {
                self.suppressed += 1;
                None
            }
            _ => {
                self.last = Some(now);
                Some(std::mem::take(&mut self.suppressed))
            }
        }
    }
}

impl Default for DiagnosticThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_counts_suppressed() {
        let start = Instant::now();
        let mut throttle = DiagnosticThrottle::new(Duration::from_secs(1));

        assert_eq!(throttle.check(start), Some(0));
        assert_eq!(throttle.check(start + Duration::from_millis(10)), None);
        assert_eq!(throttle.check(start + Duration::from_millis(20)), None);
        assert_eq!(throttle.check(start + Duration::from_secs(2)), Some(2));
    }
}
