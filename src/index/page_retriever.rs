//! [`PageRetriever`]: the page-backed [`Retriever`] implementation that
//! drives incremental insert against a [`BufferManager`] (`spec.md`
//! §4.3 "Node retriever & buffer/WAL integration"). The in-memory
//! analog is [`crate::retriever::InMemoryRetriever`]; both implement
//! the same trait so `hnsw::graph::insert`/`search` never know which
//! one they are talking to.

use std::collections::HashMap;

use crate::buffer::{BufferManager, PageGuard};
use crate::cache::SlotCache;
use crate::error::{GraphError, Result, RetrieverError};
use crate::hnsw::node::Node;
use crate::page::Page;
use crate::retriever::Retriever;
use crate::row_id::RowId;
use crate::slot::{Slot, INVALID_BLOCK};
use crate::vector::{Quantization, Vector};

/// Per-context cap on extra-dirtied pages (`spec.md` §4.3 "Resource
/// caps": "order of 100"). Exceeding it aborts the insert with a fatal
/// error rather than silently widening the transaction.
pub const EXTRA_DIRTIED_BUDGET: usize = 100;

/// A page-backed [`Retriever`]. Holds every page it has touched this
/// insert in `extra_dirtied` (`spec.md` §4.3's "extra-dirtied set");
/// reads check that map before falling back to the host, and writes
/// always go through it, so a single insert only ever has one working
/// copy of any given page.
pub struct PageRetriever<'a, B: BufferManager> {
    host: &'a B,
    m: u32,
    quantization: Quantization,
    dim: usize,
    last_data_block: u32,
    next_seqid: u32,
    num_nodes: u32,
    extra_dirtied: HashMap<u32, Page>,
    dirty_order: Vec<u32>,
    cache: SlotCache,
}

impl<'a, B: BufferManager> PageRetriever<'a, B> {
    pub fn new(host: &'a B, m: u32, quantization: Quantization, dim: usize, last_data_block: u32, next_seqid: u32) -> Self {
        PageRetriever {
            host,
            m,
            quantization,
            dim,
            last_data_block,
            next_seqid,
            num_nodes: next_seqid,
            extra_dirtied: HashMap::new(),
            dirty_order: Vec::new(),
            cache: SlotCache::default(),
        }
    }

    pub fn num_nodes(&self) -> u32 {
        self.num_nodes
    }

    pub fn last_data_block(&self) -> u32 {
        self.last_data_block
    }

    /// Consume the retriever, handing back every page it dirtied in the
    /// order it first touched them — the order the host's WAL-record
    /// builder should stage them in (`spec.md` §4.3 step "finalize each
    /// WAL chunk in order").
    pub fn into_dirtied(self) -> (u32, Vec<u32>, HashMap<u32, Page>) {
        (self.last_data_block, self.dirty_order, self.extra_dirtied)
    }

    /// Slot-decode cache hit/miss counts accumulated so far, for
    /// `metrics::record_cache_stats` to fold into the process-wide
    /// Prometheus counters before the retriever (and its cache) is
    /// dropped at the end of an operation.
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }

    fn page_for_read(&self, block: u32) -> Result<Page> {
        if let Some(page) = self.extra_dirtied.get(&block) {
            return Ok(page.clone());
        }
        Ok(self.host.read_shared(block)?.page().clone())
    }

    /// `borrow(slot)`'s decode step, memoized by [`SlotCache`] — a pure
    /// performance path with no effect on the returned bytes.
    fn decode(&mut self, slot: Slot) -> Result<crate::page::DecodedTuple> {
        if let Some(tuple) = self.cache.get(slot) {
            return Ok(tuple);
        }
        let page = self.page_for_read(slot.block())?;
        let tuple = page.decode_node(slot.offset(), self.m, &self.quantization, self.dim)?;
        self.cache.insert(slot, tuple.clone());
        Ok(tuple)
    }

    /// Bring `block` into the extra-dirtied set if it isn't already
    /// there, enforcing [`EXTRA_DIRTIED_BUDGET`], then return a mutable
    /// handle to the working copy (`spec.md` §4.3 "Borrow-mut
    /// semantics" step 2-3).
    fn page_for_write(&mut self, block: u32) -> Result<&mut Page> {
        if !self.extra_dirtied.contains_key(&block) {
            if self.extra_dirtied.len() >= EXTRA_DIRTIED_BUDGET {
                return Err(RetrieverError::ExtraDirtiedBudgetExceeded {
                    budget: EXTRA_DIRTIED_BUDGET,
                    block,
                }
                .into());
            }
            let page = self.host.read_exclusive(block)?.page().clone();
            self.extra_dirtied.insert(block, page);
            self.dirty_order.push(block);
        }
        Ok(self.extra_dirtied.get_mut(&block).expect("just inserted"))
    }

    /// Dirty a brand new block, chaining it off the current tail page's
    /// `next_block` (`spec.md` §4.2 step 3's page-split path).
    fn allocate_next_block(&mut self) -> Result<u32> {
        if self.extra_dirtied.len() >= EXTRA_DIRTIED_BUDGET {
            return Err(RetrieverError::ExtraDirtiedBudgetExceeded {
                budget: EXTRA_DIRTIED_BUDGET,
                block: self.last_data_block,
            }
            .into());
        }
        let guard = self.host.allocate()?;
        let block = guard.block();
        self.extra_dirtied.insert(block, guard.page().clone());
        self.dirty_order.push(block);
        Ok(block)
    }
}

impl<'a, B: BufferManager> Retriever for PageRetriever<'a, B> {
    fn allocate(&mut self, label: RowId, level: u8, vector: Vector) -> Result<Slot> {
        if vector.dim() != self.dim {
            return Err(GraphError::DimensionMismatch {
                expected: self.dim,
                actual: vector.dim(),
            }
            .into());
        }
        let node = Node::new(label, level, vector);
        let tuple_len = node.encoded_len(self.m);
        let seqid = self.next_seqid;
        self.next_seqid += 1;

        if self.last_data_block == INVALID_BLOCK {
            self.last_data_block = self.allocate_next_block()?;
        }

        let mut block = self.last_data_block;
        if !self.page_for_write(block)?.can_fit(tuple_len) {
            let next_block = self.allocate_next_block()?;
            let current = self.page_for_write(block)?;
            let mut area = current.special_area();
            area.next_block = next_block;
            current.set_special_area(area);
            block = next_block;
            self.last_data_block = next_block;
        }

        let page = self.page_for_write(block)?;
        let offset = page.append_node(seqid, &node, self.m)?;
        let mut area = page.special_area();
        if area.first_slot == INVALID_BLOCK {
            area.first_slot = offset as u32;
        }
        area.last_slot = offset as u32;
        page.set_special_area(area);

        self.num_nodes += 1;
        Ok(Slot::from_tid(block, offset))
    }

    fn label(&mut self, slot: Slot) -> Result<RowId> {
        Ok(self.decode(slot)?.label)
    }

    fn level(&mut self, slot: Slot) -> Result<u8> {
        Ok(self.decode(slot)?.level)
    }

    fn vector(&mut self, slot: Slot) -> Result<Vector> {
        Ok(self.decode(slot)?.vector)
    }

    fn neighbors(&mut self, slot: Slot, level: u8) -> Result<Vec<Slot>> {
        let decoded = self.decode(slot)?;
        Ok(decoded.neighbor_lists.get(level as usize).cloned().unwrap_or_default())
    }

    fn set_neighbors(&mut self, slot: Slot, level: u8, neighbors: &[Slot]) -> Result<()> {
        let page = self.page_for_write(slot.block())?;
        page.rewrite_neighbors(slot.offset(), level, self.m, neighbors)?;
        self.cache.invalidate(slot);
        Ok(())
    }

    fn len(&self) -> usize {
        self.num_nodes as usize
    }
}
