//! The K-NN scan driver: `begin_scan` / `rescan` / `get_tuple` /
//! `end_scan`, the iterator protocol `spec.md` §6's host-index access
//! method contract names for a scan. The search itself is just
//! `hnsw::graph::search` pointed at a fresh [`PageRetriever`]; this
//! module's job is packaging that one-shot call as something a caller
//! can pull results from one at a time, re-issue with a new query
//! (`rescan`), and eventually tear down (`end_scan`).

use crate::buffer::{BufferManager, FileHost, PageGuard};
use crate::error::Result;
use crate::header::IndexHeader;
use crate::hnsw::graph::{self, GraphState};
use crate::hnsw::HnswParams;
use crate::index::page_retriever::PageRetriever;
use crate::metrics;
use crate::row_id::RowId;
use crate::vector::{Metric, Vector};

pub struct ScanState<'a> {
    host: &'a FileHost,
    header: IndexHeader,
    params: HnswParams,
    results: std::vec::IntoIter<(RowId, f32)>,
}

impl<'a> ScanState<'a> {
    /// `begin_scan` (`spec.md` §6).
    pub fn begin_scan(host: &'a FileHost, query: &Vector, k: usize) -> Result<Self> {
        let header = IndexHeader::read_from_page(host.read_shared(0)?.page())?;
        let params = HnswParams::new(header.m, header.ef_construction, header.ef_search)?;
        let results = run_search(host, &header, &params, query, k)?;
        Ok(ScanState {
            host,
            header,
            params,
            results: results.into_iter(),
        })
    }

    /// `rescan` (`spec.md` §6): re-run the search with a new query
    /// against the same opened index, without re-reading the header.
    pub fn rescan(&mut self, query: &Vector, k: usize) -> Result<()> {
        let results = run_search(self.host, &self.header, &self.params, query, k)?;
        self.results = results.into_iter();
        Ok(())
    }

    /// `get_tuple` (`spec.md` §6): pull the next `(row_id, distance)`
    /// pair, or `None` once the scan is exhausted.
    pub fn get_tuple(&mut self) -> Option<(RowId, f32)> {
        self.results.next()
    }

    /// `end_scan` (`spec.md` §6). Nothing to release explicitly —
    /// `PageRetriever`'s pins are scoped to the one `run_search` call
    /// that already returned, so dropping `self` is sufficient.
    pub fn end_scan(self) {}
}

fn run_search(host: &FileHost, header: &IndexHeader, params: &HnswParams, query: &Vector, k: usize) -> Result<Vec<(RowId, f32)>> {
    metrics::SCANS_TOTAL.inc();
    let _timer = metrics::Timer::new(&metrics::SCAN_DURATION);
    if header.entry_slot.is_invalid() {
        return Ok(Vec::new());
    }
    let mut retriever = PageRetriever::new(
        host,
        header.m,
        header.quantization.clone(),
        header.dim as usize,
        header.last_data_block,
        header.num_nodes,
    );
    let state = GraphState {
        entry_point: Some(header.entry_slot),
        max_level: retriever.level(header.entry_slot)?,
    };
    let result = graph::search(&mut retriever, &state, params, header.metric, query, k);
    metrics::record_cache_stats(retriever.cache_stats());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build;
    use crate::vector::Quantization;

    fn temp_host() -> (tempfile::TempDir, FileHost) {
        let dir = tempfile::tempdir().unwrap();
        let host = FileHost::open_at(dir.path().join("pages.db"), dir.path().join("wal.log")).unwrap();
        (dir, host)
    }

    #[test]
    fn scan_over_empty_index_returns_nothing() {
        let (_dir, host) = temp_host();
        let params = HnswParams::default();
        build::build_empty(&host, &params, Metric::L2Sq, Quantization::F32, 3).unwrap();

        let mut scan = ScanState::begin_scan(&host, &Vector::F32(vec![0.0, 0.0, 0.0]), 5).unwrap();
        assert!(scan.get_tuple().is_none());
        scan.end_scan();
    }

    #[test]
    fn scan_and_rescan_pull_results_in_order() {
        let (_dir, host) = temp_host();
        let params = HnswParams::new(4, 16, 16).unwrap();
        let tuples = vec![
            (RowId::new([0, 0, 0, 0, 0, 1]), Vector::F32(vec![0.0, 0.0, 1.0])),
            (RowId::new([0, 0, 0, 0, 0, 2]), Vector::F32(vec![0.0, 1.0, 0.0])),
            (RowId::new([0, 0, 0, 0, 0, 3]), Vector::F32(vec![1.0, 0.0, 0.0])),
        ];
        build::build(&host, &params, Metric::L2Sq, Quantization::F32, 3, params.seed, tuples).unwrap();

        let mut scan = ScanState::begin_scan(&host, &Vector::F32(vec![1.0, 1.0, 1.0]), 3).unwrap();
        let mut count = 0;
        while scan.get_tuple().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);

        scan.rescan(&Vector::F32(vec![0.0, 0.0, 1.0]), 1).unwrap();
        let (label, dist) = scan.get_tuple().unwrap();
        assert_eq!(label, RowId::new([0, 0, 0, 0, 0, 1]));
        assert!(dist < 1e-5);
    }
}
