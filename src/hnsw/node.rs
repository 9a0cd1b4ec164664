//! The graph vertex (`spec.md` §3 "Node") and its on-disk size
//! arithmetic, shared between the in-memory build graph and the page
//! layout (`page.rs`) so both agree on how many bytes a node needs.

use crate::row_id::RowId;
use crate::slot::Slot;
use crate::vector::Vector;

/// Bytes of the tuple header plus the fixed part of the node body:
/// `seqid(u32) | size(u32) | label(u64) | level(u16)` (`spec.md` §6
/// "Data page").
pub const NODE_FIXED_HEADER_BYTES: usize = 4 + 4 + 8 + 2;

/// Bytes a single packed slot identifier occupies on disk.
pub const SLOT_BYTES: usize = 6;

/// Neighbor-list capacity at a given level: `m*2` on level 0, `m` above
/// (`spec.md` §3 "Node").
pub fn neighbor_capacity(level: u8, m: u32) -> usize {
    if level == 0 {
        m as usize * 2
    } else {
        m as usize
    }
}

/// Total bytes all neighbor lists occupy for a node whose highest level
/// is `node_level`, fully padded to capacity at every level (`spec.md`
/// §6: "neighbors_level_0(6B x <= M*2, padded)").
pub fn neighbors_byte_len(node_level: u8, m: u32) -> usize {
    (0..=node_level)
        .map(|l| neighbor_capacity(l, m) * SLOT_BYTES)
        .sum()
}

/// Total encoded size of a node tuple: fixed header + padded neighbor
/// lists for every level + vector payload (`spec.md` §3 "Node size").
pub fn node_encoded_len(node_level: u8, m: u32, vector_bytes: usize) -> usize {
    NODE_FIXED_HEADER_BYTES + neighbors_byte_len(node_level, m) + vector_bytes
}

/// Byte offset, within an encoded tuple body, where level `level`'s
/// (padded) neighbor list begins. Used both to encode a fresh tuple and
/// to locate the in-place region a page-backed retriever overwrites on
/// `set_neighbors` (`spec.md` §4.3: only neighbor lists mutate after a
/// node is created).
pub fn neighbor_list_byte_offset(level: u8, m: u32) -> usize {
    NODE_FIXED_HEADER_BYTES + (0..level).map(|l| neighbor_capacity(l, m) * SLOT_BYTES).sum::<usize>()
}

/// The in-memory representation of a graph vertex. Used directly during
/// bulk build (`spec.md` §3 "Lifecycle": "the graph lives in memory")
/// and as the decoded view a [`crate::retriever::Retriever`] hands back
/// for both the in-memory and page-backed implementations.
#[derive(Clone, Debug)]
pub struct Node {
    /// The opaque row identifier this vector was built from.
    pub label: RowId,
    /// Highest level this node appears on.
    pub level: u8,
    /// `neighbors[l]` holds the node's adjacency list at level `l`, for
    /// `l` in `0..=level`. Never padded in memory; padding to capacity
    /// only happens at encode time.
    pub neighbors: Vec<Vec<Slot>>,
    pub vector: Vector,
}

impl Node {
    pub fn new(label: RowId, level: u8, vector: Vector) -> Self {
        Node {
            label,
            level,
            neighbors: vec![Vec::new(); level as usize + 1],
            vector,
        }
    }

    /// Replace the neighbor list at `level`, truncating to `cap` if the
    /// heuristic pruning pass (`spec.md` §4.1 step 3) somehow overran
    /// it. `level` must be `<= self.level`.
    pub fn set_neighbors(&mut self, level: u8, cap: usize, mut neighbors: Vec<Slot>) {
        neighbors.truncate(cap);
        self.neighbors[level as usize] = neighbors;
    }

    pub fn neighbors_at(&self, level: u8) -> &[Slot] {
        &self.neighbors[level as usize]
    }

    pub fn encoded_len(&self, m: u32) -> usize {
        node_encoded_len(self.level, m, self.vector.to_bytes().len())
    }
}
