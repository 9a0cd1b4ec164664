//! HNSW benchmark: bulk-build N vectors, run K-NN queries, and check
//! that a query built from an indexed vector comes back as its own
//! nearest neighbor. Grounded on the teacher's `bin/benchmark_hnsw.rs`
//! insert-then-query-then-validate-recall shape, rebuilt against this
//! crate's page-backed `build`/`begin_scan`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

use hnswpage::buffer::FileHost;
use hnswpage::hnsw::HnswParams;
use hnswpage::index::IndexAccessMethod;
use hnswpage::row_id::RowId;
use hnswpage::vector::{Metric, Quantization, Vector};

fn random_vector(rng: &mut StdRng, dim: usize) -> Vector {
    Vector::F32((0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
}

fn main() -> anyhow::Result<()> {
    println!("==============================================");
    println!("hnswpage bulk-build benchmark");
    println!("==============================================\n");

    let dim = 128;
    let num_vectors = 10_000;
    let num_queries = 100;
    let k = 10;

    let dir = std::env::temp_dir().join(format!("hnswpage-bench-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let host = FileHost::open_at(dir.join("pages.db"), dir.join("wal.log"))?;
    let params = HnswParams::new(16, 128, 64)?;

    let mut rng = StdRng::seed_from_u64(42);
    println!("Building {num_vectors} vectors ({dim}D)...");
    let tuples: Vec<_> = (0..num_vectors)
        .map(|i| (RowId::from_page_offset(i as u32, 0), random_vector(&mut rng, dim)))
        .collect();
    let probe_vector = tuples[num_vectors / 2].1.clone();
    let probe_label = tuples[num_vectors / 2].0;

    let start = Instant::now();
    let stats = host.build(&params, Metric::L2Sq, Quantization::F32, dim as u32, 42, tuples)?;
    let build_duration = start.elapsed();

    println!("\n--- Build performance ---");
    println!("Total time: {build_duration:?}");
    println!("Throughput: {:.0} inserts/sec", stats.index_tuples as f64 / build_duration.as_secs_f64());

    println!("\n--- Query performance ---");
    let mut query_times = Vec::with_capacity(num_queries);
    for _ in 0..num_queries {
        let query = random_vector(&mut rng, dim);
        let start = Instant::now();
        let mut scan = host.begin_scan(&query, k)?;
        let mut count = 0;
        while scan.get_tuple().is_some() {
            count += 1;
        }
        scan.end_scan();
        assert_eq!(count, k);
        query_times.push(start.elapsed().as_secs_f64() * 1000.0);
    }

    query_times.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let p50 = query_times[num_queries / 2];
    let p95 = query_times[(num_queries as f64 * 0.95) as usize];
    let avg = query_times.iter().sum::<f64>() / query_times.len() as f64;
    println!("Average: {avg:.3}ms");
    println!("p50: {p50:.3}ms");
    println!("p95: {p95:.3}ms");

    println!("\n--- Recall check ---");
    let mut scan = host.begin_scan(&probe_vector, 1)?;
    let (label, dist) = scan.get_tuple().expect("non-empty index");
    scan.end_scan();
    println!("nearest neighbor: {label:?} distance={dist:.6}");
    if label == probe_label && dist < 1e-4 {
        println!("PASS: exact match found");
    } else {
        println!("WARNING: exact match not found as nearest neighbor");
    }

    std::fs::remove_dir_all(&dir).ok();
    Ok(())
}
