//! `spec.md` §8 Scenario E: "Hamming-metric roundtrip" — build with
//! `quantization=b1, dim=64` (one 64-bit word per vector); searching for
//! a query equal to a stored vector returns distance 0.

use hnswpage::buffer::FileHost;
use hnswpage::hnsw::HnswParams;
use hnswpage::index::IndexAccessMethod;
use hnswpage::row_id::RowId;
use hnswpage::vector::{Metric, Quantization, Vector};

fn temp_host() -> (tempfile::TempDir, FileHost) {
    let dir = tempfile::tempdir().unwrap();
    let host = FileHost::open_at(dir.path().join("pages.db"), dir.path().join("wal.log")).unwrap();
    (dir, host)
}

fn binary_vector(word: u64) -> Vector {
    Vector::Binary(word.to_be_bytes().to_vec())
}

#[test]
fn exact_binary_vector_comes_back_at_distance_zero() {
    let (_dir, host) = temp_host();
    let params = HnswParams::new(4, 16, 16).unwrap();

    let tuples = vec![
        (RowId::new([0, 0, 0, 0, 0, 1]), binary_vector(0xF0F0_F0F0_F0F0_F0F0)),
        (RowId::new([0, 0, 0, 0, 0, 2]), binary_vector(0x0000_0000_0000_0000)),
        (RowId::new([0, 0, 0, 0, 0, 3]), binary_vector(0xFFFF_FFFF_FFFF_FFFF)),
        (RowId::new([0, 0, 0, 0, 0, 4]), binary_vector(0x00FF_00FF_00FF_00FF)),
    ];
    let stats = host
        .build(&params, Metric::Hamming, Quantization::Binary, 64, params.seed, tuples)
        .unwrap();
    assert_eq!(stats.index_tuples, 4);

    let query = binary_vector(0x0000_0000_0000_0000);
    let mut scan = host.begin_scan(&query, 1).unwrap();
    let (label, dist) = scan.get_tuple().expect("non-empty index");
    scan.end_scan();

    assert_eq!(label, RowId::new([0, 0, 0, 0, 0, 2]));
    assert_eq!(dist, 0.0);
}

#[test]
fn incremental_insert_of_a_binary_vector_also_roundtrips() {
    let (_dir, host) = temp_host();
    let params = HnswParams::new(4, 16, 16).unwrap();
    host.build_empty(&params, Metric::Hamming, Quantization::Binary, 64).unwrap();

    host.insert(&params, Metric::Hamming, RowId::new([9; 6]), binary_vector(0xAAAA_AAAA_AAAA_AAAA), params.seed)
        .unwrap();

    let query = binary_vector(0xAAAA_AAAA_AAAA_AAAA);
    let mut scan = host.begin_scan(&query, 1).unwrap();
    let (label, dist) = scan.get_tuple().expect("non-empty index");
    scan.end_scan();

    assert_eq!(label, RowId::new([9; 6]));
    assert_eq!(dist, 0.0);
}
