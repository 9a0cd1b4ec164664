//! The superblock (`spec.md` §3 "Page": "Superblock page (block 0)"),
//! fixed-offset fields plus the 64-byte opaque engine header that
//! carries the graph entry point (`spec.md` §6 "On-disk page layout").

use crate::error::PageError;
use crate::hnsw::HnswParams;
use crate::page::{Page, PAGE_SIZE};
use crate::slot::{Slot, INVALID_BLOCK};
use crate::vector::{Metric, Quantization};

/// Fixed 32-bit sentinel identifying the format (`spec.md` §6).
pub const MAGIC: u32 = 0x484e_5357; // "HNSW"
pub const VERSION: u32 = 1;

const ENGINE_HEADER_BYTES: usize = 64;
const HEADER_BYTES: usize = 4 * 13 + ENGINE_HEADER_BYTES;

/// The index's single superblock record, stored at a fixed offset in
/// block 0 (`spec.md` §6):
///
/// ```text
/// magic | version | dim | m | ef_c | ef | metric_kind | quantization
///   | pq | num_centroids | num_subvectors | num_nodes | last_data_block
///   | engine_header[64]  (entry_slot at a fixed offset within it)
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct IndexHeader {
    pub dim: u32,
    pub m: u32,
    pub ef_construction: u32,
    pub ef_search: u32,
    pub metric: Metric,
    pub quantization: Quantization,
    pub num_nodes: u32,
    /// `INVALID_BLOCK` iff `num_nodes == 0` (`spec.md` §3 "Index header
    /// invariants").
    pub last_data_block: u32,
    /// `Slot::INVALID` iff the index is empty; otherwise references the
    /// node with the maximum level present.
    pub entry_slot: Slot,
}

impl IndexHeader {
    pub fn new(params: &HnswParams, metric: Metric, quantization: Quantization, dim: u32) -> Self {
        IndexHeader {
            dim,
            m: params.m,
            ef_construction: params.ef_construction,
            ef_search: params.ef_search,
            metric,
            quantization,
            num_nodes: 0,
            last_data_block: INVALID_BLOCK,
            entry_slot: Slot::INVALID,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num_nodes == 0
    }

    /// Encode into the fixed-offset superblock record. The surrounding
    /// page header/free-space bytes are the host's concern; this is
    /// just the `IndexHeader` record itself.
    pub fn to_bytes(&self) -> [u8; HEADER_BYTES] {
        let mut out = [0u8; HEADER_BYTES];
        let mut w = Writer(&mut out, 0);
        w.u32(MAGIC);
        w.u32(VERSION);
        w.u32(self.dim);
        w.u32(self.m);
        w.u32(self.ef_construction);
        w.u32(self.ef_search);
        w.u32(metric_kind(self.metric));
        w.u32(self.quantization.as_u32());
        let (pq, centroids, subvectors) = match self.quantization {
            Quantization::ProductQuantized { subvectors, centroids } => (1, centroids, subvectors),
            _ => (0, 0, 0),
        };
        w.u32(pq);
        w.u32(centroids);
        w.u32(subvectors);
        w.u32(self.num_nodes);
        w.u32(self.last_data_block);

        let mut engine_header = [0u8; ENGINE_HEADER_BYTES];
        engine_header[0..6].copy_from_slice(&self.entry_slot.to_bytes());
        w.bytes(&engine_header);
        out
    }

    /// Decode the header from block 0's raw page bytes.
    pub fn read_from_page(page: &Page) -> Result<Self, PageError> {
        Self::from_bytes(page.header_prefix(HEADER_BYTES))
    }

    /// Encode the header into block 0's raw page bytes, leaving the
    /// rest of the page zeroed.
    pub fn write_into_page(&self, page: &mut Page) {
        page.write_header_prefix(&self.to_bytes());
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PageError> {
        if bytes.len() < HEADER_BYTES {
            return Err(PageError::CorruptSpecialArea(0));
        }
        let mut r = Reader(bytes, 0);
        let magic = r.u32();
        if magic != MAGIC {
            return Err(PageError::BadMagic {
                expected: MAGIC,
                actual: magic,
            });
        }
        let version = r.u32();
        if version != VERSION {
            return Err(PageError::BadVersion {
                expected: VERSION,
                actual: version,
            });
        }
        let dim = r.u32();
        let m = r.u32();
        let ef_construction = r.u32();
        let ef_search = r.u32();
        let metric = metric_from_u32(r.u32())?;
        let quantization_kind = r.u32();
        let pq = r.u32();
        let num_centroids = r.u32();
        let num_subvectors = r.u32();
        let num_nodes = r.u32();
        let last_data_block = r.u32();
        let engine_header = r.bytes(ENGINE_HEADER_BYTES);
        let entry_bytes: [u8; 6] = engine_header[0..6].try_into().expect("6 bytes");
        let entry_slot = Slot::from_bytes(entry_bytes);

        let quantization = quantization_from_parts(quantization_kind, pq != 0, num_centroids, num_subvectors)?;

        Ok(IndexHeader {
            dim,
            m,
            ef_construction,
            ef_search,
            metric,
            quantization,
            num_nodes,
            last_data_block,
            entry_slot,
        })
    }
}

fn metric_kind(metric: Metric) -> u32 {
    match metric {
        Metric::L2Sq => 0,
        Metric::Cosine => 1,
        Metric::InnerProduct => 2,
        Metric::Hamming => 3,
    }
}

fn metric_from_u32(v: u32) -> Result<Metric, PageError> {
    Ok(match v {
        0 => Metric::L2Sq,
        1 => Metric::Cosine,
        2 => Metric::InnerProduct,
        3 => Metric::Hamming,
        other => {
            return Err(PageError::InvariantViolation {
                block: 0,
                slot: Slot::INVALID,
                detail: format!("unknown metric kind {other}"),
            })
        }
    })
}

fn quantization_from_parts(kind: u32, pq: bool, centroids: u32, subvectors: u32) -> Result<Quantization, PageError> {
    if pq {
        return Ok(Quantization::ProductQuantized { subvectors, centroids });
    }
    Ok(match kind {
        0 => Quantization::F32,
        1 => Quantization::F16,
        2 => Quantization::I8,
        3 => Quantization::Binary,
        4 => Quantization::ProductQuantized { subvectors, centroids },
        other => {
            return Err(PageError::InvariantViolation {
                block: 0,
                slot: Slot::INVALID,
                detail: format!("unknown quantization kind {other}"),
            })
        }
    })
}

/// The maximum vector dimension this page size can hold at level 0 with
/// `m=1` (the tightest possible node). Used to reject out-of-range
/// `dim` at build start (`spec.md` §8 "Boundary behaviors").
pub fn max_dimension_for(m: u32, quantization: &Quantization) -> usize {
    let overhead = crate::hnsw::node::node_encoded_len(0, m, 0);
    let budget = PAGE_SIZE.saturating_sub(overhead + 64);
    match quantization {
        Quantization::F32 => budget / 4,
        Quantization::F16 => budget / 2,
        Quantization::I8 => budget,
        Quantization::Binary => budget * 8,
        Quantization::ProductQuantized { .. } => budget,
    }
}

struct Writer<'a>(&'a mut [u8], usize);
impl<'a> Writer<'a> {
    fn u32(&mut self, v: u32) {
        self.0[self.1..self.1 + 4].copy_from_slice(&v.to_le_bytes());
        self.1 += 4;
    }
    fn bytes(&mut self, v: &[u8]) {
        self.0[self.1..self.1 + v.len()].copy_from_slice(v);
        self.1 += v.len();
    }
}

struct Reader<'a>(&'a [u8], usize);
impl<'a> Reader<'a> {
    fn u32(&mut self) -> u32 {
        let v = u32::from_le_bytes(self.0[self.1..self.1 + 4].try_into().expect("4 bytes"));
        self.1 += 4;
        v
    }
    fn bytes(&mut self, n: usize) -> &'a [u8] {
        let v = &self.0[self.1..self.1 + n];
        self.1 += n;
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_header_has_invariants() {
        let params = HnswParams::default();
        let header = IndexHeader::new(&params, Metric::L2Sq, Quantization::F32, 128);
        assert!(header.is_empty());
        assert_eq!(header.last_data_block, INVALID_BLOCK);
        assert!(header.entry_slot.is_invalid());
    }

    #[test]
    fn header_round_trips_through_bytes() {
        let params = HnswParams::default();
        let mut header = IndexHeader::new(&params, Metric::Cosine, Quantization::F16, 64);
        header.num_nodes = 7;
        header.last_data_block = 3;
        header.entry_slot = Slot::from_tid(3, 2);

        let bytes = header.to_bytes();
        let back = IndexHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header, back);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = [0u8; HEADER_BYTES];
        bytes[0..4].copy_from_slice(&0u32.to_le_bytes());
        assert!(IndexHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn product_quantization_round_trips() {
        let params = HnswParams::default();
        let header = IndexHeader::new(
            &params,
            Metric::L2Sq,
            Quantization::ProductQuantized {
                subvectors: 8,
                centroids: 256,
            },
            128,
        );
        let back = IndexHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(header.quantization, back.quantization);
    }
}
