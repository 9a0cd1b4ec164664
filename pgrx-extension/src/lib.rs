use pgrx::prelude::*;

use hnswpage::buffer::FileHost;
use hnswpage::hnsw::HnswParams;
use hnswpage::index::IndexAccessMethod;
use hnswpage::row_id::RowId;
use hnswpage::vector::{Metric, Quantization, Vector};

pg_module_magic!();

/// Build a scratch index of `num_vectors` random `dim`-dimensional
/// vectors under a temp file pair and report build/query timings. Not a
/// real `CREATE INDEX ... USING hnswpage` access method — wiring the
/// planner/executor hooks is out of scope here (`SPEC_FULL.md` §1).
#[pg_extern]
fn hnswpage_benchmark(num_vectors: i32, dim: i32) -> String {
    if num_vectors <= 0 || num_vectors > 200_000 {
        return "Error: num_vectors must be between 1 and 200,000".to_string();
    }
    if dim <= 0 || dim > 2048 {
        return "Error: dim must be between 1 and 2048".to_string();
    }

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::time::Instant;

    let dir = std::env::temp_dir().join(format!("hnswpage-pg-bench-{}", std::process::id()));
    if let Err(e) = std::fs::create_dir_all(&dir) {
        return format!("Error: failed to create scratch directory: {e}");
    }
    let host = match FileHost::open_at(dir.join("pages.db"), dir.join("wal.log")) {
        Ok(host) => host,
        Err(e) => return format!("Error: failed to open scratch page file: {e}"),
    };
    let params = match HnswParams::new(16, 64, 64) {
        Ok(p) => p,
        Err(e) => return format!("Error: invalid index parameters: {e}"),
    };

    let mut rng = StdRng::seed_from_u64(42);
    let tuples: Vec<_> = (0..num_vectors)
        .map(|i| {
            let vector = Vector::F32((0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect());
            (RowId::from_page_offset(i as u32, 0), vector)
        })
        .collect();

    let start = Instant::now();
    let stats = match host.build(&params, Metric::L2Sq, Quantization::F32, dim as u32, 42, tuples) {
        Ok(s) => s,
        Err(e) => return format!("Error: build failed: {e}"),
    };
    let build_time = start.elapsed();

    let query = Vector::F32((0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect());
    let start = Instant::now();
    let mut found = 0;
    match host.begin_scan(&query, 10) {
        Ok(mut scan) => {
            while scan.get_tuple().is_some() {
                found += 1;
            }
            scan.end_scan();
        }
        Err(e) => return format!("Error: scan failed: {e}"),
    }
    let query_time = start.elapsed();

    std::fs::remove_dir_all(&dir).ok();

    format!(
        "hnswpage benchmark\n\
         vectors: {num_vectors}, dim: {dim}\n\
         build time: {build_time:?} ({:.0} inserts/sec)\n\
         query time: {query_time:?} ({found} of 10 neighbors returned)",
        stats.index_tuples as f64 / build_time.as_secs_f64(),
    )
}

#[pg_extern]
fn hnswpage_version() -> String {
    format!("hnswpage {} - HNSW storage engine, experimental pgrx shell", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
pub mod pg_test {
    pub fn setup(_options: Vec<&str>) {}

    pub fn postgresql_conf_options() -> Vec<&'static str> {
        vec![]
    }
}

#[cfg(any(test, feature = "pg_test"))]
#[pgrx::pg_schema]
mod tests {
    use pgrx::prelude::*;

    #[pg_test]
    fn test_hnswpage_version_reports_crate_version() {
        let version = crate::hnswpage_version();
        assert!(version.contains("hnswpage"));
    }
}
