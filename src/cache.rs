//! `SlotCache`: an ambient, non-semantic memoization layer for resolved
//! slot lookups inside a retriever context (`SPEC_FULL.md` §3, grounded
//! on `original_source/src/hnsw/block_number_cache.h`/`node_cache.h`).
//! Pure performance optimization — invalidated on any write to the slot
//! it holds, never consulted for correctness.
//!
//! Structured like the teacher's `cache.rs::RowCache`: an `lru::LruCache`
//! behind a lock, plus hit/miss counters exposed as [`CacheStats`].

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;

use crate::page::DecodedTuple;
use crate::slot::Slot;

/// Default capacity if a caller doesn't size the cache explicitly —
/// enough to cover one insert's worth of neighbor dereferences at
/// `m=16` without tuning (`2*M` neighbors at level 0, touched a few
/// times each across the heuristic pruning pass).
const DEFAULT_CAPACITY: usize = 512;

pub struct SlotCache {
    entries: LruCache<Slot, DecodedTuple>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SlotCache {
    pub fn new(capacity: usize) -> Self {
        SlotCache {
            entries: LruCache::new(NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1")),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&mut self, slot: Slot) -> Option<DecodedTuple> {
        if let Some(tuple) = self.entries.get(&slot) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(tuple.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn insert(&mut self, slot: Slot, tuple: DecodedTuple) {
        self.entries.put(slot, tuple);
    }

    /// Drop a stale entry, e.g. after `set_neighbors` rewrote the tuple
    /// this cache had memoized.
    pub fn invalidate(&mut self, slot: Slot) {
        self.entries.pop(&slot);
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats { hits, misses }
    }
}

impl Default for SlotCache {
    fn default() -> Self {
        SlotCache::new(DEFAULT_CAPACITY)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
