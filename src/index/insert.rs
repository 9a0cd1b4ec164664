//! The insert transaction state machine (`spec.md` §4.3 "State machine
//! of an insert transaction"):
//!
//! ```text
//!    IDLE --begin--> COLLECTING --allocate-slot--> MUTATING --finish--> COMMITTED
//!                         |                             |
//!                         +----------error--------------+--> ROLLBACK
//! ```
//!
//! Bound directly to [`FileHost`] rather than the generic
//! [`BufferManager`](crate::buffer::BufferManager) trait, since
//! committing needs the concrete WAL handle — `spec.md` §4.3's "host"
//! is the abstract buffer manager *and* WAL-record builder together,
//! and `FileHost` is this crate's one concrete instance of both.

use rand::Rng;

use crate::buffer::{BufferManager, FileHost, PageGuard};
use crate::error::{GraphError, HnswError, Result};
use crate::header::IndexHeader;
use crate::hnsw::graph::{self, GraphState};
use crate::hnsw::HnswParams;
use crate::index::page_retriever::PageRetriever;
use crate::metrics;
use crate::row_id::RowId;
use crate::vector::{Metric, Vector};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Collecting,
    Mutating,
    Committed,
    RolledBack,
}

/// Insert one `(label, vector)` tuple into a persisted index
/// (`spec.md` §4.2 "Incremental insert" / §4.3 state machine). Returns
/// the transaction's terminal state for observability; the `Result`
/// carries the actual success/failure.
#[tracing::instrument(skip(host, rng))]
pub fn insert_tuple<R: Rng>(
    host: &FileHost,
    params: &HnswParams,
    metric: Metric,
    label: RowId,
    vector: Vector,
    rng: &mut R,
) -> Result<TransactionState> {
    metrics::INSERTS_TOTAL.inc();
    let _timer = metrics::Timer::new(&metrics::INSERT_DURATION);

    // IDLE -> COLLECTING: exclusive lock on the superblock (`spec.md`
    // §5 "Ordering": "Superblock is always locked first").
    let header_guard = host.read_exclusive(0)?;
    let mut header = IndexHeader::read_from_page(header_guard.page())?;
    drop(header_guard);

    if vector.dim() as u32 != header.dim {
        return Err(GraphError::DimensionMismatch {
            expected: header.dim as usize,
            actual: vector.dim(),
        }
        .into());
    }

    let mut graph_state = GraphState::default();
    if !header.entry_slot.is_invalid() {
        let mut probe = PageRetriever::new(host, header.m, header.quantization.clone(), header.dim as usize, header.last_data_block, header.num_nodes);
        graph_state.entry_point = Some(header.entry_slot);
        graph_state.max_level = probe.level(header.entry_slot)?;
    }

    // COLLECTING -> MUTATING: `graph::insert`'s first act is
    // `retriever.allocate`, reserving the new node's page slot.
    let mut retriever = PageRetriever::new(
        host,
        header.m,
        header.quantization.clone(),
        header.dim as usize,
        header.last_data_block,
        header.num_nodes,
    );

    let outcome = graph::insert(&mut retriever, &mut graph_state, params, metric, label, vector, rng);

    let new_entry = graph_state.entry_point;
    metrics::record_cache_stats(retriever.cache_stats());
    let (last_data_block, dirty_order, extra_dirtied) = retriever.into_dirtied();

    match outcome {
        Ok(_) => {
            // MUTATING -> COMMITTED: stage every dirtied page plus the
            // updated superblock into one WAL transaction, finish it
            // (the durability commit point), then apply the writes.
            metrics::EXTRA_DIRTIED_PAGES.set(dirty_order.len() as i64);
            for &block in &dirty_order {
                let page = &extra_dirtied[&block];
                host.wal().stage_page(block, page.as_bytes().to_vec());
            }

            header.num_nodes += 1;
            header.last_data_block = last_data_block;
            if let Some(entry) = new_entry {
                header.entry_slot = entry;
            }
            let mut header_page = host.read_exclusive(0)?.page().clone();
            header.write_into_page(&mut header_page);
            host.wal().stage_page(0, header_page.as_bytes().to_vec());

            host.wal().finish()?;
            metrics::WAL_WRITES.inc();

            for &block in &dirty_order {
                host.write_block(block, &extra_dirtied[&block])?;
            }
            host.write_block(0, &header_page)?;
            metrics::EXTRA_DIRTIED_PAGES.set(0);

            tracing::info!(num_nodes = header.num_nodes, pages_touched = dirty_order.len(), "insert committed");
            Ok(TransactionState::Committed)
        }
        Err(err) => {
            // ROLLBACK: nothing was staged to the WAL yet, so dropping
            // `extra_dirtied` (already consumed above) discards every
            // in-flight mutation atomically (`spec.md` §4.3
            // "Cancellation": "partial mutations... are discarded
            // atomically").
            host.wal().discard();
            metrics::EXTRA_DIRTIED_PAGES.set(0);
            metrics::INSERTS_ROLLED_BACK.inc();
            tracing::warn!(error = %err, "insert rolled back");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build;
    use crate::vector::Quantization;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn temp_host() -> (tempfile::TempDir, FileHost) {
        let dir = tempfile::tempdir().unwrap();
        let host = FileHost::open_at(dir.path().join("pages.db"), dir.path().join("wal.log")).unwrap();
        (dir, host)
    }

    #[test]
    fn insert_into_empty_index_becomes_entry_point() {
        let (_dir, host) = temp_host();
        let params = HnswParams::new(4, 16, 16).unwrap();
        build::build_empty(&host, &params, Metric::L2Sq, Quantization::F32, 2).unwrap();

        let mut rng = StdRng::seed_from_u64(params.seed);
        let state = insert_tuple(
            &host,
            &params,
            Metric::L2Sq,
            RowId::new([1, 0, 0, 0, 0, 0]),
            Vector::F32(vec![1.0, 2.0]),
            &mut rng,
        )
        .unwrap();
        assert_eq!(state, TransactionState::Committed);

        let header = IndexHeader::read_from_page(host.read_shared(0).unwrap().page()).unwrap();
        assert_eq!(header.num_nodes, 1);
        assert!(!header.entry_slot.is_invalid());
    }

    #[test]
    fn sequential_inserts_accumulate_into_one_searchable_graph() {
        let (_dir, host) = temp_host();
        let params = HnswParams::new(4, 16, 16).unwrap();
        build::build_empty(&host, &params, Metric::L2Sq, Quantization::F32, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(params.seed);

        for i in 0..15u8 {
            insert_tuple(
                &host,
                &params,
                Metric::L2Sq,
                RowId::new([i, 0, 0, 0, 0, 0]),
                Vector::F32(vec![i as f32, (i * 2) as f32]),
                &mut rng,
            )
            .unwrap();
        }

        let header = IndexHeader::read_from_page(host.read_shared(0).unwrap().page()).unwrap();
        assert_eq!(header.num_nodes, 15);
    }

    #[test]
    fn dimension_mismatch_is_rejected_before_mutating() {
        let (_dir, host) = temp_host();
        let params = HnswParams::default();
        build::build_empty(&host, &params, Metric::L2Sq, Quantization::F32, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(params.seed);

        let err = insert_tuple(
            &host,
            &params,
            Metric::L2Sq,
            RowId::new([0; 6]),
            Vector::F32(vec![1.0, 2.0, 3.0]),
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, HnswError::Graph(GraphError::DimensionMismatch { .. })));

        let header = IndexHeader::read_from_page(host.read_shared(0).unwrap().page()).unwrap();
        assert_eq!(header.num_nodes, 0, "rejected insert must not mutate the header");
    }
}
