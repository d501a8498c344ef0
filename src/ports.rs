//! Deterministic port assignment for relay targets
//!
//! Each target owns three consecutive ports starting at
//! `port_base + index * PORT_STRIDE`: control (RTSP over TCP plus the RTP
//! control channel over UDP), timing, and audio data.

use crate::error::ConfigurationError;

/// Ports consumed per target
pub const PORT_STRIDE: u16 = 3;

/// Ports owned by one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortAssignment {
    /// First port of the range
    pub base: u16,
    /// RTSP (TCP) and RTP control (UDP)
    pub control_port: u16,
    /// RTP timing (UDP)
    pub timing_port: u16,
    /// RTP audio (UDP)
    pub data_port: u16,
}

impl PortAssignment {
    /// All three ports
    #[must_use]
    pub fn ports(&self) -> [u16; 3] {
        [self.control_port, self.timing_port, self.data_port]
    }

    /// Whether any port is shared with `other`
    #[must_use]
    pub fn overlaps(&self, other: &PortAssignment) -> bool {
        self.ports().iter().any(|p| other.ports().contains(p))
    }
}

/// Computes port assignments from a base port
#[derive(Debug, Clone, Copy)]
pub struct PortAllocator {
    port_base: u16,
}

impl PortAllocator {
    /// Create an allocator starting at `port_base`
    #[must_use]
    pub fn new(port_base: u16) -> Self {
        Self { port_base }
    }

    /// Ports for the target at `target_index`
    ///
    /// # Errors
    /// Returns `ConfigurationError` if the base is zero or the range would
    /// exceed 65535.
    pub fn assign(&self, target_index: usize) -> Result<PortAssignment, ConfigurationError> {
        if self.port_base == 0 {
            return Err(ConfigurationError::InvalidPortBase(self.port_base));
        }

        let overflow = || ConfigurationError::PortOverflow {
            index: target_index,
            base: self.port_base,
        };

        let offset = u32::try_from(target_index)
            .ok()
            .and_then(|i| i.checked_mul(u32::from(PORT_STRIDE)))
            .ok_or_else(overflow)?;
        let base = u32::from(self.port_base)
            .checked_add(offset)
            .ok_or_else(overflow)?;
        let last = base + u32::from(PORT_STRIDE) - 1;
        if last > u32::from(u16::MAX) {
            return Err(overflow());
        }

        let base = u16::try_from(base).map_err(|_| overflow())?;
        Ok(PortAssignment {
            base,
            control_port: base,
            timing_port: base + 1,
            data_port: base + 2,
        })
    }

    /// Assign ports for `count` targets, verifying they are pairwise disjoint
    ///
    /// # Errors
    /// Returns `ConfigurationError` on overflow or collision.
    pub fn assign_all(&self, count: usize) -> Result<Vec<PortAssignment>, ConfigurationError> {
        let assignments = (0..count)
            .map(|i| self.assign(i))
            .collect::<Result<Vec<_>, _>>()?;

        for (i, a) in assignments.iter().enumerate() {
            for (j, b) in assignments.iter().enumerate().skip(i + 1) {
                if a.overlaps(b) {
                    return Err(ConfigurationError::PortCollision {
                        first: i,
                        second: j,
                    });
                }
            }
        }

        Ok(assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_targets_at_default_base() {
        let ports = PortAllocator::new(7000).assign_all(2).unwrap();
        assert_eq!(ports[0].ports(), [7000, 7001, 7002]);
        assert_eq!(ports[1].ports(), [7003, 7004, 7005]);
    }

    #[test]
    fn test_assign_is_pure() {
        let allocator = PortAllocator::new(7000);
        assert_eq!(allocator.assign(4).unwrap(), allocator.assign(4).unwrap());
        assert_eq!(allocator.assign(4).unwrap().control_port, 7012);
    }

    #[test]
    fn test_last_valid_range() {
        let allocator = PortAllocator::new(65533);
        let ports = allocator.assign(0).unwrap();
        assert_eq!(ports.data_port, 65535);
        assert!(matches!(
            allocator.assign(1),
            Err(ConfigurationError::PortOverflow { index: 1, .. })
        ));
    }

    #[test]
    fn test_zero_base_rejected() {
        assert!(matches!(
            PortAllocator::new(0).assign(0),
            Err(ConfigurationError::InvalidPortBase(0))
        ));
    }

    #[test]
    fn test_overflow_in_assign_all() {
        assert!(PortAllocator::new(65000).assign_all(200).is_err());
    }

    #[test]
    fn test_overlap_detection() {
        let a = PortAllocator::new(7000).assign(0).unwrap();
        let b = PortAllocator::new(7002).assign(0).unwrap();
        let c = PortAllocator::new(7003).assign(0).unwrap();
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
