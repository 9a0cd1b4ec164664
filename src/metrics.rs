//! Prometheus metrics, mirroring the teacher's `metrics.rs` pattern
//! (`once_cell::sync::Lazy` statics registered via the `prometheus`
//! macros) but scoped to this crate's operations: build, insert, scan,
//! WAL flush, and the extra-dirtied / slot-cache budgets that are
//! specific to a page-backed HNSW index.

use once_cell::sync::Lazy;
use prometheus::{register_histogram, register_int_counter, register_int_gauge, Encoder, Histogram, IntCounter, IntGauge, TextEncoder};
use std::time::Instant;

pub static BUILDS_TOTAL: Lazy<IntCounter> = Lazy::new(|| register_int_counter!("hnswpage_builds_total", "Total number of bulk build operations").unwrap());

pub static INSERTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| register_int_counter!("hnswpage_inserts_total", "Total number of incremental insert operations").unwrap());

pub static INSERTS_ROLLED_BACK: Lazy<IntCounter> =
    Lazy::new(|| register_int_counter!("hnswpage_inserts_rolled_back_total", "Total number of inserts that rolled back").unwrap());

pub static SCANS_TOTAL: Lazy<IntCounter> = Lazy::new(|| register_int_counter!("hnswpage_scans_total", "Total number of K-NN scans started").unwrap());

pub static INSERT_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "hnswpage_insert_duration_seconds",
        "Incremental insert latency in seconds",
        vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]
    )
    .unwrap()
});

pub static SCAN_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "hnswpage_scan_duration_seconds",
        "K-NN scan latency in seconds",
        vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]
    )
    .unwrap()
});

pub static WAL_WRITES: Lazy<IntCounter> = Lazy::new(|| register_int_counter!("hnswpage_wal_writes_total", "Total WAL stage+finish operations").unwrap());

pub static EXTRA_DIRTIED_PAGES: Lazy<IntGauge> =
    Lazy::new(|| register_int_gauge!("hnswpage_extra_dirtied_pages", "Pages held in the current insert's extra-dirtied set").unwrap());

pub static SLOT_CACHE_HITS: Lazy<IntCounter> = Lazy::new(|| register_int_counter!("hnswpage_slot_cache_hits_total", "SlotCache hits").unwrap());

pub static SLOT_CACHE_MISSES: Lazy<IntCounter> = Lazy::new(|| register_int_counter!("hnswpage_slot_cache_misses_total", "SlotCache misses").unwrap());

/// RAII latency timer, recorded into `histogram` on drop.
pub struct Timer {
    start: Instant,
    histogram: &'static Histogram,
}

impl Timer {
    pub fn new(histogram: &'static Histogram) -> Self {
        Timer { start: Instant::now(), histogram }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Record the `SlotCache` stats snapshot from a finished retriever into
/// the counters above.
pub fn record_cache_stats(stats: crate::cache::CacheStats) {
    if stats.hits > 0 {
        SLOT_CACHE_HITS.inc_by(stats.hits);
    }
    if stats.misses > 0 {
        SLOT_CACHE_MISSES.inc_by(stats.misses);
    }
}

/// Render all registered metrics in Prometheus text exposition format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
