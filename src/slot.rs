//! The 6-byte slot identifier: a dense sequence number during build, a
//! (block, offset) tuple after persistence. Both interpretations are
//! carried by the same storage bits (`spec.md` §3 "Slot identifier").

use serde::{Deserialize, Serialize};

/// Sentinel block number meaning "no page" / "no node".
pub const INVALID_BLOCK: u32 = u32::MAX;

/// A 6-byte, unaligned slot identifier.
///
/// During in-memory build this is read as a dense `u32` sequence number
/// (the `offset` half is unused and kept zero). After the page layout's
/// edge-rewrite pass (`spec.md` §4.2 step 4) every stored instance is
/// reinterpreted as `(block: u32, offset: u16)`, a item pointer into a
/// data page. The type itself does not know which interpretation is
/// live at a given moment — that is a property of the lifecycle stage,
/// not the bits — so callers use `from_seq`/`as_seq` during build and
/// `from_tid`/`block`/`offset` after persistence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    block: u32,
    offset: u16,
}

impl Slot {
    pub const INVALID: Slot = Slot {
        block: INVALID_BLOCK,
        offset: 0,
    };

    /// Interpret as a dense build-time sequence number.
    pub fn from_seq(seq: u32) -> Self {
        Slot {
            block: seq,
            offset: 0,
        }
    }

    /// Read back the build-time sequence number. Only meaningful before
    /// the edge-rewrite pass has run.
    pub fn as_seq(self) -> u32 {
        self.block
    }

    /// Construct a persisted (block, offset) item pointer.
    pub fn from_tid(block: u32, offset: u16) -> Self {
        Slot { block, offset }
    }

    pub fn block(self) -> u32 {
        self.block
    }

    pub fn offset(self) -> u16 {
        self.offset
    }

    pub fn is_invalid(self) -> bool {
        self.block == INVALID_BLOCK
    }

    /// Pack into the 6 little-endian bytes written on disk:
    /// `block(u32 LE) | offset(u16 LE)`.
    pub fn to_bytes(self) -> [u8; 6] {
        let mut out = [0u8; 6];
        out[0..4].copy_from_slice(&self.block.to_le_bytes());
        out[4..6].copy_from_slice(&self.offset.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        let block = u32::from_le_bytes(bytes[0..4].try_into().expect("4 bytes"));
        let offset = u16::from_le_bytes(bytes[4..6].try_into().expect("2 bytes"));
        Slot { block, offset }
    }
}

impl Default for Slot {
    fn default() -> Self {
        Slot::INVALID
    }
}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered by (block, offset) so neighbor tie-breaks in `spec.md` §4.1
/// ("break by lower slot identifier") are deterministic regardless of
/// which lifecycle stage the slot is in.
impl Ord for Slot {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.block, self.offset).cmp(&(other.block, other.offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_round_trip() {
        let s = Slot::from_seq(12345);
        assert_eq!(s.as_seq(), 12345);
    }

    #[test]
    fn tid_round_trip_through_bytes() {
        let s = Slot::from_tid(7, 42);
        let bytes = s.to_bytes();
        assert_eq!(bytes.len(), 6);
        let back = Slot::from_bytes(bytes);
        assert_eq!(back, s);
        assert_eq!(back.block(), 7);
        assert_eq!(back.offset(), 42);
    }

    #[test]
    fn invalid_is_distinguishable() {
        assert!(Slot::INVALID.is_invalid());
        assert!(!Slot::from_tid(0, 0).is_invalid());
    }

    #[test]
    fn ordering_is_by_block_then_offset() {
        let a = Slot::from_tid(1, 5);
        let b = Slot::from_tid(1, 6);
        let c = Slot::from_tid(2, 0);
        assert!(a < b);
        assert!(b < c);
    }

    proptest::proptest! {
        /// `spec.md` §8 "slot round-trip": any (block, offset) pair
        /// survives `to_bytes`/`from_bytes` unchanged.
        #[test]
        fn prop_tid_round_trips_through_bytes(block: u32, offset: u16) {
            let s = Slot::from_tid(block, offset);
            let back = Slot::from_bytes(s.to_bytes());
            proptest::prop_assert_eq!(s, back);
            proptest::prop_assert_eq!(back.block(), block);
            proptest::prop_assert_eq!(back.offset(), offset);
        }

        /// Any build-time sequence number survives `from_seq`/`as_seq`.
        #[test]
        fn prop_seq_round_trips(seq: u32) {
            proptest::prop_assert_eq!(Slot::from_seq(seq).as_seq(), seq);
        }
    }
}
