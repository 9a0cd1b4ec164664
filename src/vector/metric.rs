//! Distance metrics (`spec.md` §4.1 "Parameters").

use serde::{Deserialize, Serialize};

use super::quantization::Vector;
use super::simd_distance::{cosine_distance, hamming_distance, l2sq_distance, l2sq_distance_i8, neg_inner_product};

/// Distance metric an index is built with. Fixed per index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    /// Squared Euclidean distance.
    L2Sq,
    /// `1 - cosine similarity`.
    Cosine,
    /// Negative dot product (ranks by maximum inner product).
    InnerProduct,
    /// Hamming distance between bit-packed vectors.
    Hamming,
}

impl Metric {
    /// Compute the distance between two vectors of the same quantization
    /// kind. Panics (via the underlying slice-length assertions) if the
    /// vectors were not built with matching dimension/quantization —
    /// that mismatch is a programming error the caller must already have
    /// rejected at the API boundary (`GraphError::DimensionMismatch`).
    pub fn distance(&self, a: &Vector, b: &Vector) -> f32 {
        match (self, a, b) {
            (Metric::Hamming, Vector::Binary(a), Vector::Binary(b)) => hamming_distance(a, b) as f32,
            (Metric::L2Sq, Vector::I8(a), Vector::I8(b)) => l2sq_distance_i8(a, b),
            (_, Vector::F32(a), Vector::F32(b)) => self.distance_f32(a, b),
            (_, Vector::F16(a), Vector::F16(b)) => {
                let af: Vec<f32> = a.iter().map(|&v| super::quantization::half_to_f32(v)).collect();
                let bf: Vec<f32> = b.iter().map(|&v| super::quantization::half_to_f32(v)).collect();
                self.distance_f32(&af, &bf)
            }
            _ => panic!("distance() called across mismatched quantization kinds"),
        }
    }

    fn distance_f32(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::L2Sq => l2sq_distance(a, b),
            Metric::Cosine => cosine_distance(a, b),
            Metric::InnerProduct => neg_inner_product(a, b),
            Metric::Hamming => panic!("Hamming metric requires Binary-quantized vectors"),
        }
    }
}
