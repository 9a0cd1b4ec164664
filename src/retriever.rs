//! The node retriever: translates a [`Slot`] into a borrowed node image
//! (`spec.md` §4.3 "Node retriever & buffer/WAL integration").
//!
//! The source's `borrow`/`borrow_mut` return raw pointers into shared
//! buffer memory, valid until the enclosing scan or insert ends — the
//! redesign note in `spec.md` §9 calls for modeling this as a trait
//! parameterized by a context carrying the pin list and the
//! extra-dirtied map (`original_source/src/hnsw/retriever.h`). Rust has
//! no safe way to hand back a pointer with a lifetime tied to "until
//! insert commit" without borrowing the retriever itself, so this
//! crate's [`Retriever`] trait instead exposes narrow accessor/mutator
//! methods keyed by `(slot, level)` — the same "byte spans with
//! accessor functions" idiom `spec.md` §9 prescribes for the flexible
//! array members, applied one layer up to the borrow interface itself.
//! Only neighbor lists are ever mutated after a node is created, so
//! `set_neighbors` is the only write path, and it is exactly
//! `borrow_mut` narrowed to what the graph engine actually rewrites.

use crate::error::Result;
use crate::hnsw::node::Node;
use crate::row_id::RowId;
use crate::slot::Slot;
use crate::vector::Vector;

/// The graph engine's only window into node storage. One implementation
/// backs the in-memory bulk-build graph ([`InMemoryRetriever`]); another
/// (`crate::index::page_retriever::PageRetriever`) backs persisted,
/// incremental inserts against a [`crate::buffer::BufferManager`].
pub trait Retriever {
    /// Allocate a brand new node and return the slot it was assigned.
    /// Implementations decide what "allocate" means: a dense sequence
    /// number during build, or a reserved page slot during insert
    /// (`spec.md` §4.2 "Incremental insert" step 3).
    fn allocate(&mut self, label: RowId, level: u8, vector: Vector) -> Result<Slot>;

    /// `borrow(slot)`, narrowed to the label (`spec.md` §4.3 step "Borrow
    /// (read) semantics").
    fn label(&mut self, slot: Slot) -> Result<RowId>;

    /// `borrow(slot)`, narrowed to the level.
    fn level(&mut self, slot: Slot) -> Result<u8>;

    /// `borrow(slot)`, narrowed to the vector payload.
    fn vector(&mut self, slot: Slot) -> Result<Vector>;

    /// `borrow(slot)`, narrowed to one level's neighbor list.
    fn neighbors(&mut self, slot: Slot, level: u8) -> Result<Vec<Slot>>;

    /// `borrow_mut(slot)`: overwrite one level's neighbor list in place.
    /// This is the only mutation the graph engine ever performs on an
    /// existing node (`spec.md` §4.1 step 3 "overwrite").
    fn set_neighbors(&mut self, slot: Slot, level: u8, neighbors: &[Slot]) -> Result<()>;

    /// Total node count, for header bookkeeping and termination checks.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A [`Retriever`] backed by a plain `Vec<Node>`, used for the
/// in-memory bulk-build phase described in `spec.md` §3 "Lifecycle":
/// "Build: nodes are created in dense order by a bulk scan; the graph
/// lives in memory". Slots are dense sequence numbers (`Slot::from_seq`)
/// until the page layout's edge-rewrite pass (`spec.md` §4.2 step 4)
/// converts them to `(block, offset)` tuples.
#[derive(Default)]
pub struct InMemoryRetriever {
    nodes: Vec<Node>,
}

impl InMemoryRetriever {
    pub fn new() -> Self {
        InMemoryRetriever { nodes: Vec::new() }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    fn get(&self, slot: Slot) -> Result<&Node> {
        self.nodes
            .get(slot.as_seq() as usize)
            .ok_or_else(|| crate::error::GraphError::NodeNotFound(slot).into())
    }
}

impl Retriever for InMemoryRetriever {
    fn allocate(&mut self, label: RowId, level: u8, vector: Vector) -> Result<Slot> {
        let slot = Slot::from_seq(self.nodes.len() as u32);
        self.nodes.push(Node::new(label, level, vector));
        Ok(slot)
    }

    fn label(&mut self, slot: Slot) -> Result<RowId> {
        Ok(self.get(slot)?.label)
    }

    fn level(&mut self, slot: Slot) -> Result<u8> {
        Ok(self.get(slot)?.level)
    }

    fn vector(&mut self, slot: Slot) -> Result<Vector> {
        Ok(self.get(slot)?.vector.clone())
    }

    fn neighbors(&mut self, slot: Slot, level: u8) -> Result<Vec<Slot>> {
        let node = self.get(slot)?;
        if level as usize >= node.neighbors.len() {
            return Ok(Vec::new());
        }
        Ok(node.neighbors_at(level).to_vec())
    }

    fn set_neighbors(&mut self, slot: Slot, level: u8, neighbors: &[Slot]) -> Result<()> {
        let idx = slot.as_seq() as usize;
        let node = self
            .nodes
            .get_mut(idx)
            .ok_or(crate::error::GraphError::NodeNotFound(slot))?;
        // The graph engine is the one that enforces `m`/`m*2` capacity
        // before calling in (`spec.md` §4.1 step 3); the retriever just
        // stores whatever it is handed.
        node.set_neighbors(level, neighbors.len(), neighbors.to_vec());
        Ok(())
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }
}
