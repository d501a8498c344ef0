//! Jitter buffer for reordering RTP packets
//!
//! Sequence numbers are 16-bit and wrap. Internally every packet is stored
//! under a monotonically increasing 64-bit index derived from its signed
//! distance to the next expected sequence, so ordering survives wraparound.
//!
//! The buffer is driven by an explicit `now` so gap handling is
//! deterministic: callers pass the arrival or poll time.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Jitter buffer tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterConfig {
    /// Packets accepted ahead of the next expected sequence; anything
    /// further ahead restarts the stream at that packet
    pub reorder_window: u16,
    /// How long a missing packet is waited for once later packets are queued
    pub gap_timeout: Duration,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            reorder_window: 64,
            gap_timeout: Duration::from_millis(200),
        }
    }
}

/// Jitter buffer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JitterStats {
    /// Total packets offered
    pub packets_received: u64,
    /// Packets dropped because their slot was already played or skipped
    pub packets_late: u64,
    /// Packets dropped as duplicates
    pub packets_duplicate: u64,
    /// Times the stream jumped beyond the reorder window
    pub resyncs: u64,
    /// Gaps reported
    pub gaps: u64,
    /// Packets covered by reported gaps
    pub packets_concealed: u64,
    /// Current buffer depth
    pub current_depth: usize,
}

/// Result of adding a packet
#[derive(Debug, PartialEq, Eq)]
pub enum JitterResult {
    /// Packet buffered
    Buffered,
    /// Packet's slot was already played or skipped
    TooLate,
    /// Packet was already buffered
    Duplicate,
    /// Packet was far ahead; buffered packets were discarded and the stream
    /// restarts at this packet
    Resynced {
        /// Packets thrown away
        discarded: usize,
    },
}

/// Result of asking for the next packet
#[derive(Debug, PartialEq, Eq)]
pub enum NextPacket<T> {
    /// Next packet in sequence
    Ready {
        /// Its sequence number
        sequence: u16,
        /// The packet
        packet: T,
    },
    /// Nothing to release yet
    Wait,
    /// Missing packets given up on; the buffer has advanced past them
    Gap {
        /// First missing sequence number
        first: u16,
        /// Number of consecutive missing packets
        missing: u16,
    },
}

/// Jitter buffer for reordering RTP packets
pub struct JitterBuffer<T> {
    packets: BTreeMap<u64, T>,
    next_seq: Option<u16>,
    next_index: u64,
    config: JitterConfig,
    gap_since: Option<Instant>,
    stats: JitterStats,
}

impl<T> JitterBuffer<T> {
    /// Create a new jitter buffer
    #[must_use]
    pub fn new(config: JitterConfig) -> Self {
        Self {
            packets: BTreeMap::new(),
            next_seq: None,
            next_index: 0,
            config: JitterConfig {
                reorder_window: config.reorder_window.max(1),
                ..config
            },
            gap_since: None,
            stats: JitterStats::default(),
        }
    }

    /// Expect `seq` as the next packet
    ///
    /// Used when the sender announces its starting sequence (RECORD
    /// `RTP-Info`). Without it the first packet received sets the start.
    pub fn start_at(&mut self, seq: u16) {
        self.reset();
        self.next_seq = Some(seq);
    }

    /// Add a packet to the buffer
    pub fn push(&mut self, seq: u16, packet: T, now: Instant) -> JitterResult {
        self.stats.packets_received += 1;

        let Some(next) = self.next_seq else {
            self.next_seq = Some(seq);
            self.insert(0, packet);
            return JitterResult::Buffered;
        };

        #[allow(
            clippy::cast_possible_wrap,
            reason = "signed reinterpretation yields the wrap-aware distance"
        )]
        let distance = seq.wrapping_sub(next) as i16;
        let Ok(distance) = u16::try_from(distance) else {
            self.stats.packets_late += 1;
            return JitterResult::TooLate;
        };

        if distance >= self.config.reorder_window {
            let discarded = self.packets.len();
            self.packets.clear();
            self.next_seq = Some(seq);
            self.gap_since = None;
            self.stats.resyncs += 1;
            self.insert(0, packet);
            return JitterResult::Resynced { discarded };
        }

        let offset = u64::from(distance);
        if self.packets.contains_key(&(self.next_index + offset)) {
            self.stats.packets_duplicate += 1;
            return JitterResult::Duplicate;
        }

        self.insert(offset, packet);
        if distance > 0 && self.gap_since.is_none() {
            self.gap_since = Some(now);
        }
        JitterResult::Buffered
    }

    /// Release the next packet, or a gap once it has been missing for the
    /// configured timeout
    pub fn pop(&mut self, now: Instant) -> NextPacket<T> {
        self.pop_inner(now, false)
    }

    /// Release the next packet, reporting any gap immediately
    ///
    /// Used when the stream ends and nothing more will arrive.
    pub fn pop_now(&mut self, now: Instant) -> NextPacket<T> {
        self.pop_inner(now, true)
    }

    fn pop_inner(&mut self, now: Instant, force: bool) -> NextPacket<T> {
        let Some(next) = self.next_seq else {
            return NextPacket::Wait;
        };

        if let Some(packet) = self.packets.remove(&self.next_index) {
            self.advance(1);
            self.gap_since = None;
            if !self.packets.is_empty() && !self.packets.contains_key(&self.next_index) {
                self.gap_since = Some(now);
            }
            self.stats.current_depth = self.packets.len();
            return NextPacket::Ready {
                sequence: next,
                packet,
            };
        }

        let Some(&available) = self.packets.keys().next() else {
            self.gap_since = None;
            return NextPacket::Wait;
        };

        let since = *self.gap_since.get_or_insert(now);
        if !force && now.saturating_duration_since(since) < self.config.gap_timeout {
            return NextPacket::Wait;
        }

        let missing = available - self.next_index;
        self.advance(missing);
        self.gap_since = None;
        self.stats.gaps += 1;
        self.stats.packets_concealed += missing;

        NextPacket::Gap {
            first: next,
            missing: u16::try_from(missing).unwrap_or(u16::MAX),
        }
    }

    fn insert(&mut self, offset: u64, packet: T) {
        self.packets.insert(self.next_index + offset, packet);
        self.stats.current_depth = self.packets.len();
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "sequence numbers wrap at 16 bits"
    )]
    fn advance(&mut self, count: u64) {
        self.next_index += count;
        self.next_seq = self
            .next_seq
            .map(|seq| seq.wrapping_add(count as u16));
    }

    /// Drop all packets and forget the expected sequence
    pub fn reset(&mut self) {
        self.packets.clear();
        self.next_seq = None;
        self.gap_since = None;
        self.stats.current_depth = 0;
    }

    /// Next sequence number expected, once known
    #[must_use]
    pub fn next_sequence(&self) -> Option<u16> {
        self.next_seq
    }

    /// Get current statistics
    #[must_use]
    pub fn stats(&self) -> JitterStats {
        self.stats.clone()
    }

    /// Buffer depth in packets
    #[must_use]
    pub fn depth(&self) -> usize {
        self.packets.len()
    }

    /// Whether nothing is buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}
