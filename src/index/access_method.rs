//! `IndexAccessMethod`: the host-index access method contract
//! (`spec.md` §6 "Host-index access method contract"), collected into
//! one trait so a real embedding (the pgrx extension, say) has a single
//! seam to implement against rather than calling `build`/`insert`/scan
//! functions loose.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::buffer::FileHost;
use crate::error::Result;
use crate::hnsw::HnswParams;
use crate::index::build::{self, BuildStats};
use crate::index::insert::{self, TransactionState};
use crate::index::scan::ScanState;
use crate::row_id::RowId;
use crate::vector::{Metric, Quantization, Vector};

/// Collaborators to re-expose at a real host boundary (`spec.md` §6):
/// `build`, `build_empty`, `insert`, the `begin_scan`/`rescan`/
/// `get_tuple`/`end_scan` iterator protocol, and the optional
/// `bulk_delete`/`vacuum_cleanup` pair.
pub trait IndexAccessMethod {
    fn build(&self, params: &HnswParams, metric: Metric, quantization: Quantization, dim: u32, seed: u64, tuples: Vec<(RowId, Vector)>) -> Result<BuildStats>;

    fn build_empty(&self, params: &HnswParams, metric: Metric, quantization: Quantization, dim: u32) -> Result<()>;

    fn insert(&self, params: &HnswParams, metric: Metric, label: RowId, vector: Vector, seed: u64) -> Result<TransactionState>;

    fn begin_scan(&self, query: &Vector, k: usize) -> Result<ScanState<'_>>;

    /// No-op: this crate carries no separate delete-bitmap or visibility
    /// bookkeeping (`spec.md` §6 "may be a no-op").
    fn bulk_delete(&self) -> Result<()> {
        Ok(())
    }

    /// No-op for the same reason as `bulk_delete`.
    fn vacuum_cleanup(&self) -> Result<()> {
        Ok(())
    }
}

impl IndexAccessMethod for FileHost {
    fn build(&self, params: &HnswParams, metric: Metric, quantization: Quantization, dim: u32, seed: u64, tuples: Vec<(RowId, Vector)>) -> Result<BuildStats> {
        build::build(self, params, metric, quantization, dim, seed, tuples)
    }

    fn build_empty(&self, params: &HnswParams, metric: Metric, quantization: Quantization, dim: u32) -> Result<()> {
        build::build_empty(self, params, metric, quantization, dim).map_err(Into::into)
    }

    fn insert(&self, params: &HnswParams, metric: Metric, label: RowId, vector: Vector, seed: u64) -> Result<TransactionState> {
        let mut rng = StdRng::seed_from_u64(seed);
        insert::insert_tuple(self, params, metric, label, vector, &mut rng)
    }

    fn begin_scan(&self, query: &Vector, k: usize) -> Result<ScanState<'_>> {
        ScanState::begin_scan(self, query, k)
    }
}
