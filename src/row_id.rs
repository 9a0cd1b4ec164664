//! The opaque row identifier the host uses to locate a vector's source
//! row (`spec.md` §3 "Vector", glossary "Row identifier").

use serde::{Deserialize, Serialize};

/// A 6-byte opaque locator, stored in a node's `label` field padded to 8
/// bytes on disk (`spec.md` §3 "Node").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowId([u8; 6]);

impl RowId {
    pub fn new(bytes: [u8; 6]) -> Self {
        RowId(bytes)
    }

    /// Convenience constructor for tests and for hosts whose native row
    /// locator is itself a (page, offset) pair, like the slot format.
    pub fn from_page_offset(page: u32, offset: u16) -> Self {
        let mut bytes = [0u8; 6];
        bytes[0..4].copy_from_slice(&page.to_le_bytes());
        bytes[4..6].copy_from_slice(&offset.to_le_bytes());
        RowId(bytes)
    }

    /// Pad to the 8-byte on-disk `label` field.
    pub fn to_label_bytes(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[0..6].copy_from_slice(&self.0);
        out
    }

    pub fn from_label_bytes(bytes: [u8; 8]) -> Self {
        let mut inner = [0u8; 6];
        inner.copy_from_slice(&bytes[0..6]);
        RowId(inner)
    }

    pub fn as_bytes(self) -> [u8; 6] {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_round_trip() {
        let id = RowId::from_page_offset(7, 3);
        let label = id.to_label_bytes();
        assert_eq!(label[6], 0);
        assert_eq!(label[7], 0);
        assert_eq!(RowId::from_label_bytes(label), id);
    }
}
