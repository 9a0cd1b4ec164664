//! The fixed-size data page: a slotted layout with an `items[]`
//! directory growing from the head, node tuples growing from the tail,
//! and a fixed special area at the very end (`spec.md` §3 "Page", §6
//! "Data page").

use crate::error::PageError;
use crate::hnsw::node::{
    neighbor_capacity, neighbor_list_byte_offset, node_encoded_len, Node, NODE_FIXED_HEADER_BYTES, SLOT_BYTES,
};
use crate::row_id::RowId;
use crate::slot::{Slot, INVALID_BLOCK};
use crate::vector::{Quantization, Vector};

/// Page size in bytes. `spec.md` §3 names 8 KiB as the example size.
pub const PAGE_SIZE: usize = 8192;

/// `lower(u16) | upper(u16)`: offsets bounding the free space region,
/// mirroring the classic slotted-page `pd_lower`/`pd_upper` idiom the
/// "host-defined page header" in `spec.md` §6 stands in for.
const PAGE_HEADER_BYTES: usize = 4;

/// `first_slot(u32) | last_slot(u32) | next_block(u32)`.
pub const SPECIAL_AREA_BYTES: usize = 12;

const ITEM_POINTER_BYTES: usize = 4; // (offset: u16, length: u16)

/// The advisory per-page bookkeeping fields (`spec.md` §4.2
/// "Special-area discipline"): used for crawls (validation, vacuum),
/// never consulted by the retriever during a search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpecialArea {
    pub first_slot: u32,
    pub last_slot: u32,
    pub next_block: u32,
}

impl SpecialArea {
    pub const EMPTY: SpecialArea = SpecialArea {
        first_slot: INVALID_BLOCK,
        last_slot: INVALID_BLOCK,
        next_block: INVALID_BLOCK,
    };

    fn encode(self) -> [u8; SPECIAL_AREA_BYTES] {
        let mut out = [0u8; SPECIAL_AREA_BYTES];
        out[0..4].copy_from_slice(&self.first_slot.to_le_bytes());
        out[4..8].copy_from_slice(&self.last_slot.to_le_bytes());
        out[8..12].copy_from_slice(&self.next_block.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Self {
        SpecialArea {
            first_slot: u32::from_le_bytes(bytes[0..4].try_into().expect("4 bytes")),
            last_slot: u32::from_le_bytes(bytes[4..8].try_into().expect("4 bytes")),
            next_block: u32::from_le_bytes(bytes[8..12].try_into().expect("4 bytes")),
        }
    }
}

/// A decoded node tuple read back from a page item.
#[derive(Clone, Debug)]
pub struct DecodedTuple {
    pub seqid: u32,
    pub label: RowId,
    pub level: u8,
    /// `neighbor_lists[l]` is the (unpadded — `Slot::INVALID` entries
    /// dropped) neighbor list at level `l`.
    pub neighbor_lists: Vec<Vec<Slot>>,
    pub vector: Vector,
}

/// One fixed-size data page (`spec.md` §3 "Page" / §6 "Data page").
#[derive(Clone)]
pub struct Page {
    buf: Vec<u8>,
}

impl Page {
    /// A freshly allocated, empty data page.
    pub fn new_data_page() -> Self {
        let mut buf = vec![0u8; PAGE_SIZE];
        Self::write_bounds(&mut buf, PAGE_HEADER_BYTES as u16, (PAGE_SIZE - SPECIAL_AREA_BYTES) as u16);
        let mut page = Page { buf };
        page.set_special_area(SpecialArea::EMPTY);
        page
    }

    pub fn from_bytes(buf: Vec<u8>) -> Result<Self, PageError> {
        if buf.len() != PAGE_SIZE {
            return Err(PageError::CorruptSpecialArea(0));
        }
        Ok(Page { buf })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn lower(&self) -> u16 {
        u16::from_le_bytes(self.buf[0..2].try_into().expect("2 bytes"))
    }

    fn upper(&self) -> u16 {
        u16::from_le_bytes(self.buf[2..4].try_into().expect("2 bytes"))
    }

    fn write_bounds(buf: &mut [u8], lower: u16, upper: u16) {
        buf[0..2].copy_from_slice(&lower.to_le_bytes());
        buf[2..4].copy_from_slice(&upper.to_le_bytes());
    }

    pub fn item_count(&self) -> u16 {
        (self.lower() - PAGE_HEADER_BYTES as u16) / ITEM_POINTER_BYTES as u16
    }

    pub fn free_space(&self) -> usize {
        (self.upper() as usize).saturating_sub(self.lower() as usize)
    }

    /// Whether a tuple of `tuple_len` bytes (plus its item-pointer
    /// overhead) still fits (`spec.md` §4.2 step 3 "remaining free
    /// space").
    pub fn can_fit(&self, tuple_len: usize) -> bool {
        self.free_space() >= tuple_len + ITEM_POINTER_BYTES
    }

    fn item_pointer(&self, offset: u16) -> (u16, u16) {
        let base = PAGE_HEADER_BYTES + offset as usize * ITEM_POINTER_BYTES;
        let tuple_offset = u16::from_le_bytes(self.buf[base..base + 2].try_into().expect("2 bytes"));
        let tuple_len = u16::from_le_bytes(self.buf[base + 2..base + 4].try_into().expect("2 bytes"));
        (tuple_offset, tuple_len)
    }

    /// Append raw tuple bytes, returning the item offset (the `offset`
    /// half of a persisted [`Slot`]) it was assigned.
    pub fn append_item(&mut self, tuple: &[u8]) -> Result<u16, PageError> {
        if !self.can_fit(tuple.len()) {
            return Err(PageError::NodeTooLarge {
                size: tuple.len(),
                page_size: PAGE_SIZE,
            });
        }
        let lower = self.lower();
        let upper = self.upper();
        let tuple_offset = upper - tuple.len() as u16;
        self.buf[tuple_offset as usize..upper as usize].copy_from_slice(tuple);

        let ptr_base = lower as usize;
        self.buf[ptr_base..ptr_base + 2].copy_from_slice(&tuple_offset.to_le_bytes());
        self.buf[ptr_base + 2..ptr_base + 4].copy_from_slice(&(tuple.len() as u16).to_le_bytes());

        let item_index = self.item_count();
        Self::write_bounds(&mut self.buf, lower + ITEM_POINTER_BYTES as u16, tuple_offset);
        Ok(item_index)
    }

    pub fn get_item(&self, offset: u16) -> Result<&[u8], PageError> {
        if offset >= self.item_count() {
            return Err(PageError::InvariantViolation {
                block: 0,
                slot: Slot::from_tid(0, offset),
                detail: "item offset out of range".into(),
            });
        }
        let (tuple_offset, tuple_len) = self.item_pointer(offset);
        Ok(&self.buf[tuple_offset as usize..(tuple_offset + tuple_len) as usize])
    }

    fn get_item_mut(&mut self, offset: u16) -> Result<&mut [u8], PageError> {
        if offset >= self.item_count() {
            return Err(PageError::InvariantViolation {
                block: 0,
                slot: Slot::from_tid(0, offset),
                detail: "item offset out of range".into(),
            });
        }
        let (tuple_offset, tuple_len) = self.item_pointer(offset);
        Ok(&mut self.buf[tuple_offset as usize..(tuple_offset + tuple_len) as usize])
    }

    /// Overwrite the first `bytes.len()` bytes of the page verbatim.
    /// Used only for the superblock (block 0), which carries a fixed
    /// [`crate::header::IndexHeader`] record rather than slotted items
    /// (`spec.md` §3 "Page": "Superblock page (block 0): a single
    /// `IndexHeader` record at a fixed offset").
    pub fn write_header_prefix(&mut self, bytes: &[u8]) {
        self.buf[0..bytes.len()].copy_from_slice(bytes);
    }

    pub fn header_prefix(&self, len: usize) -> &[u8] {
        &self.buf[0..len]
    }

    pub fn special_area(&self) -> SpecialArea {
        SpecialArea::decode(&self.buf[PAGE_SIZE - SPECIAL_AREA_BYTES..])
    }

    pub fn set_special_area(&mut self, area: SpecialArea) {
        let encoded = area.encode();
        self.buf[PAGE_SIZE - SPECIAL_AREA_BYTES..].copy_from_slice(&encoded);
    }

    /// Append a new node as an item tuple (`spec.md` §4.2 step 3).
    /// `seqid` is the build-time dense sequence number stored in the
    /// tuple header for crawl-time cross-checks.
    pub fn append_node(&mut self, seqid: u32, node: &Node, m: u32) -> Result<u16, PageError> {
        let tuple = encode_node_tuple(seqid, node, m);
        self.append_item(&tuple)
    }

    pub fn decode_node(&self, offset: u16, m: u32, quantization: &Quantization, dim: usize) -> Result<DecodedTuple, PageError> {
        let bytes = self.get_item(offset)?;
        decode_node_tuple(bytes, m, quantization, dim)
    }

    /// Overwrite one level's neighbor list in place — the only mutation
    /// a page-backed retriever's `set_neighbors` performs on an
    /// existing tuple (`spec.md` §4.3).
    pub fn rewrite_neighbors(&mut self, offset: u16, level: u8, m: u32, neighbors: &[Slot]) -> Result<(), PageError> {
        let cap = neighbor_capacity(level, m);
        let region_start = neighbor_list_byte_offset(level, m);
        let tuple = self.get_item_mut(offset)?;
        for i in 0..cap {
            let slot = neighbors.get(i).copied().unwrap_or(Slot::INVALID);
            let byte_off = region_start + i * SLOT_BYTES;
            tuple[byte_off..byte_off + SLOT_BYTES].copy_from_slice(&slot.to_bytes());
        }
        Ok(())
    }
}

/// Encode a node tuple: `seqid(u32) | size(u32) | label(u64) |
/// level(u16) | neighbors per level (padded) | vector payload`
/// (`spec.md` §6 "Data page").
pub fn encode_node_tuple(seqid: u32, node: &Node, m: u32) -> Vec<u8> {
    let vector_bytes = node.vector.to_bytes();
    let size = node_encoded_len(node.level, m, vector_bytes.len());

    let mut out = Vec::with_capacity(size);
    out.extend_from_slice(&seqid.to_le_bytes());
    out.extend_from_slice(&(size as u32).to_le_bytes());
    out.extend_from_slice(&node.label.to_label_bytes());
    out.extend_from_slice(&(node.level as u16).to_le_bytes());

    for l in 0..=node.level {
        let cap = neighbor_capacity(l, m);
        let neighbors = node.neighbors_at(l);
        for i in 0..cap {
            let slot = neighbors.get(i).copied().unwrap_or(Slot::INVALID);
            out.extend_from_slice(&slot.to_bytes());
        }
    }
    out.extend_from_slice(&vector_bytes);
    out
}

pub fn decode_node_tuple(bytes: &[u8], m: u32, quantization: &Quantization, dim: usize) -> Result<DecodedTuple, PageError> {
    if bytes.len() < NODE_FIXED_HEADER_BYTES {
        return Err(PageError::CorruptSpecialArea(0));
    }
    let seqid = u32::from_le_bytes(bytes[0..4].try_into().expect("4 bytes"));
    let mut label_bytes = [0u8; 8];
    label_bytes.copy_from_slice(&bytes[8..16]);
    let label = RowId::from_label_bytes(label_bytes);
    let level = u16::from_le_bytes(bytes[16..18].try_into().expect("2 bytes")) as u8;

    let mut offset = NODE_FIXED_HEADER_BYTES;
    let mut neighbor_lists = Vec::with_capacity(level as usize + 1);
    for l in 0..=level {
        let cap = neighbor_capacity(l, m);
        let mut list = Vec::with_capacity(cap);
        for _ in 0..cap {
            let raw: [u8; 6] = bytes[offset..offset + 6].try_into().expect("6 bytes");
            let slot = Slot::from_bytes(raw);
            if !slot.is_invalid() {
                list.push(slot);
            }
            offset += 6;
        }
        neighbor_lists.push(list);
    }

    let vector_len = quantization.encoded_len(dim);
    let vector = Vector::from_bytes(&bytes[offset..offset + vector_len], quantization, dim);

    Ok(DecodedTuple {
        seqid,
        label,
        level,
        neighbor_lists,
        vector,
    })
}
