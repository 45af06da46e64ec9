//! Absolute window identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

/// 64-bit window identifier: epoch in the high 32 bits, sequence in the low 32.
///
/// Ordering is plain unsigned comparison of the packed value, so every window
/// of a later epoch sorts after every window of an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(u64);

impl WindowId {
    pub const ZERO: WindowId = WindowId(0);
    pub const MAX: WindowId = WindowId(u64::MAX);

    pub fn new(epoch: u32, sequence: u32) -> Self {
        Self(((epoch as u64) << 32) | sequence as u64)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn epoch(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn sequence(self) -> u32 {
        self.0 as u32
    }

    /// The next window id in packed order, or `None` at `u64::MAX`.
    pub fn successor(self) -> Option<WindowId> {
        self.0.checked_add(1).map(WindowId)
    }
}

impl From<u64> for WindowId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}:{:08x}", self.epoch(), self.sequence())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packing() {
        let id = WindowId::new(0x7afe_babe, 1);
        assert_eq!(id.as_u64(), 0x7afe_babe_0000_0001);
        assert_eq!(id.epoch(), 0x7afe_babe);
        assert_eq!(id.sequence(), 1);
        assert_eq!(id.to_string(), "7afebabe:00000001");
    }

    #[test]
    fn test_later_epoch_sorts_after() {
        assert!(WindowId::new(1, 0) > WindowId::new(0, u32::MAX));
        assert!(WindowId::new(3, 5) < WindowId::new(3, 6));
    }

    #[test]
    fn test_successor_saturates() {
        assert_eq!(WindowId::ZERO.successor(), Some(WindowId::from_raw(1)));
        assert_eq!(WindowId::MAX.successor(), None);
    }
}
