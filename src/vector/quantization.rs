//! Quantization kinds and the in-memory vector payload they produce.
//!
//! `spec.md` §3: "A vector is ... of one quantization kind: 32-bit float,
//! 16-bit float, 8-bit signed integer, or 1-bit-per-component binary".
//! §3 (added, from `original_source/src/hnsw/product_quantization.h`)
//! adds a product-quantized kind whose codebook is trained externally.

use serde::{Deserialize, Serialize};

/// Which quantization kind an index stores its vectors as. Fixed per
/// index (`spec.md` §4.1 "Parameters").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Quantization {
    F32,
    F16,
    I8,
    Binary,
    /// (added) Product-quantized: `m` subvectors, each coded against a
    /// `k`-entry codebook trained out-of-band (the K-means routine named
    /// as an out-of-scope collaborator in `spec.md` §1).
    ProductQuantized { subvectors: u32, centroids: u32 },
}

impl Quantization {
    /// Encoded size in bytes of a vector of `dim` components under this
    /// quantization kind.
    pub fn encoded_len(&self, dim: usize) -> usize {
        match self {
            Quantization::F32 => dim * 4,
            Quantization::F16 => dim * 2,
            Quantization::I8 => dim,
            Quantization::Binary => dim.div_ceil(8),
            Quantization::ProductQuantized { subvectors, .. } => *subvectors as usize,
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Quantization::F32 => 0,
            Quantization::F16 => 1,
            Quantization::I8 => 2,
            Quantization::Binary => 3,
            Quantization::ProductQuantized { .. } => 4,
        }
    }
}

/// An in-memory vector payload, tagged by the quantization kind it was
/// decoded under. `spec.md`'s node retriever hands back byte spans
/// (`borrow`/`borrow_mut`); this type is what the graph engine decodes
/// those spans into for distance computation.
#[derive(Clone, Debug, PartialEq)]
pub enum Vector {
    F32(Vec<f32>),
    F16(Vec<u16>),
    I8(Vec<i8>),
    /// Bit-packed, one bit per component, MSB-first within each byte.
    Binary(Vec<u8>),
    /// One byte per subvector, each the index into that subvector's
    /// codebook.
    ProductQuantized(Vec<u8>),
}

impl Vector {
    pub fn dim(&self) -> usize {
        match self {
            Vector::F32(v) => v.len(),
            Vector::F16(v) => v.len(),
            Vector::I8(v) => v.len(),
            Vector::Binary(v) => v.len() * 8,
            Vector::ProductQuantized(v) => v.len(),
        }
    }

    /// Encode into the on-disk byte representation (`spec.md` §6 "vector
    /// payload").
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Vector::F32(v) => v.iter().flat_map(|f| f.to_le_bytes()).collect(),
            Vector::F16(v) => v.iter().flat_map(|f| f.to_le_bytes()).collect(),
            Vector::I8(v) => v.iter().map(|&i| i as u8).collect(),
            Vector::Binary(v) => v.clone(),
            Vector::ProductQuantized(v) => v.clone(),
        }
    }

    pub fn from_bytes(bytes: &[u8], quantization: &Quantization, dim: usize) -> Self {
        match quantization {
            Quantization::F32 => Vector::F32(
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes(c.try_into().expect("4 bytes")))
                    .collect(),
            ),
            Quantization::F16 => Vector::F16(
                bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes(c.try_into().expect("2 bytes")))
                    .collect(),
            ),
            Quantization::I8 => Vector::I8(bytes.iter().map(|&b| b as i8).collect()),
            Quantization::Binary => Vector::Binary(bytes[..dim.div_ceil(8)].to_vec()),
            Quantization::ProductQuantized { subvectors, .. } => {
                Vector::ProductQuantized(bytes[..*subvectors as usize].to_vec())
            }
        }
    }

    pub fn quantization(&self) -> &'static str {
        match self {
            Vector::F32(_) => "f32",
            Vector::F16(_) => "f16",
            Vector::I8(_) => "i8",
            Vector::Binary(_) => "binary",
            Vector::ProductQuantized(_) => "pq",
        }
    }
}

/// An externally-trained product-quantization codebook: one centroid
/// table per subvector (`spec.md` §3 (added), from
/// `original_source/src/hnsw/pqtable.c`). Training the centroids (the
/// K-means routine) stays the out-of-scope collaborator named in
/// `spec.md` §1; this type only carries the trained result, assembled
/// from [`crate::external_builder::frame::Message::CodebookBlock`]s
/// keyed by `subvector_index`.
#[derive(Clone, Debug, Default)]
pub struct Codebook {
    /// `subvectors[s][c]` is subvector `s`'s centroid `c`, itself a
    /// `sub_dim`-component vector.
    pub subvectors: Vec<Vec<Vec<f32>>>,
}

impl Codebook {
    /// Assemble a codebook from `(subvector_index, centroids)` pairs,
    /// the shape a stream of `CodebookBlock` messages decodes into.
    /// Blocks may arrive in any order; `num_subvectors` fixes the final
    /// table's length so a short stream leaves trailing subvectors
    /// empty rather than panicking on index arithmetic.
    pub fn from_blocks(num_subvectors: usize, blocks: impl IntoIterator<Item = (u32, Vec<Vec<f32>>)>) -> Self {
        let mut subvectors = vec![Vec::new(); num_subvectors];
        for (index, centroids) in blocks {
            if let Some(slot) = subvectors.get_mut(index as usize) {
                *slot = centroids;
            }
        }
        Codebook { subvectors }
    }

    /// Decode one subvector's raw `CodebookBlock` payload (`num_centroids`
    /// back-to-back little-endian `f32` rows of `sub_dim` components
    /// each) into the row-major centroid table `from_blocks` expects.
    pub fn decode_centroid_block(bytes: &[u8], num_centroids: usize, sub_dim: usize) -> Vec<Vec<f32>> {
        bytes
            .chunks_exact(sub_dim * 4)
            .take(num_centroids)
            .map(|row| {
                row.chunks_exact(4)
                    .map(|c| f32::from_le_bytes(c.try_into().expect("4 bytes")))
                    .collect()
            })
            .collect()
    }
}

/// Asymmetric product-quantization distance (`spec.md` §3 (added)):
/// the query stays full precision and is compared against each
/// subvector's chosen centroid directly, summed across subspaces —
/// `pqtable.c`'s precomputed distance table, computed on the fly here
/// rather than cached, since this crate has no persistent per-query
/// scratch beyond `hnsw::graph`'s own thread-local buffers. Squared-L2
/// per subspace, matching `Metric::L2Sq`'s whole-vector definition.
pub fn pq_asymmetric_distance(query: &[f32], codes: &[u8], codebook: &Codebook) -> f32 {
    let mut sum = 0.0f32;
    let mut offset = 0usize;
    for (subvector, &code) in codes.iter().enumerate() {
        let centroid = &codebook.subvectors[subvector][code as usize];
        let sub_dim = centroid.len();
        let query_slice = &query[offset..offset + sub_dim];
        for (&q, &c) in query_slice.iter().zip(centroid.iter()) {
            let d = q - c;
            sum += d * d;
        }
        offset += sub_dim;
    }
    sum
}

/// Minimal IEEE 754 binary16 -> binary32 decode (round-to-nearest
/// subnormals are flushed, which is adequate for a quantized ANN payload
/// where this is already a lossy compression step).
pub fn half_to_f32(bits: u16) -> f32 {
    let sign = ((bits >> 15) & 0x1) as u32;
    let exponent = ((bits >> 10) & 0x1f) as u32;
    let mantissa = (bits & 0x3ff) as u32;

    let (exponent, mantissa) = if exponent == 0 {
        (0, mantissa) // subnormal/zero, flushed below
    } else if exponent == 0x1f {
        (0xff, mantissa << 13) // inf/nan
    } else {
        (exponent - 15 + 127, mantissa << 13)
    };

    f32::from_bits((sign << 31) | (exponent << 23) | mantissa)
}

/// Minimal f32 -> binary16 encode (round-toward-zero truncation).
pub fn f32_to_half(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = (bits >> 31) & 0x1;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x7f_ffff;

    if exponent == 0xff {
        return ((sign << 15) | 0x7c00 | ((mantissa != 0) as u32) << 9) as u16;
    }

    let new_exp = exponent - 127 + 15;
    if new_exp <= 0 {
        return (sign << 15) as u16;
    }
    if new_exp >= 0x1f {
        return ((sign << 15) | 0x7c00) as u16;
    }

    ((sign << 15) | ((new_exp as u32) << 10) | (mantissa >> 13)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_round_trips_through_bytes() {
        let v = Vector::F32(vec![1.0, -2.5, 3.25]);
        let bytes = v.to_bytes();
        let back = Vector::from_bytes(&bytes, &Quantization::F32, 3);
        assert_eq!(v, back);
    }

    #[test]
    fn binary_encoded_len_rounds_up() {
        assert_eq!(Quantization::Binary.encoded_len(9), 2);
        assert_eq!(Quantization::Binary.encoded_len(8), 1);
    }

    #[test]
    fn half_round_trip_is_close() {
        for f in [0.0f32, 1.0, -1.0, 3.14, 65504.0, -0.5] {
            let half = f32_to_half(f);
            let back = half_to_f32(half);
            assert!((back - f).abs() <= f.abs() * 0.01 + 1e-3, "{f} -> {back}");
        }
    }

    #[test]
    fn codebook_decodes_le_f32_rows_from_a_raw_block() {
        let mut bytes = Vec::new();
        for v in [1.0f32, 2.0, 3.0, 4.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let centroids = Codebook::decode_centroid_block(&bytes, 2, 2);
        assert_eq!(centroids, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn codebook_from_blocks_places_out_of_order_subvectors_correctly() {
        let codebook = Codebook::from_blocks(
            2,
            vec![(1, vec![vec![9.0, 9.0]]), (0, vec![vec![0.0, 0.0], vec![1.0, 1.0]])],
        );
        assert_eq!(codebook.subvectors[0], vec![vec![0.0, 0.0], vec![1.0, 1.0]]);
        assert_eq!(codebook.subvectors[1], vec![vec![9.0, 9.0]]);
    }

    #[test]
    fn pq_distance_to_the_exact_centroid_is_zero() {
        let codebook = Codebook::from_blocks(
            2,
            vec![(0, vec![vec![0.0, 0.0], vec![1.0, 1.0]]), (1, vec![vec![5.0, 5.0], vec![-5.0, -5.0]])],
        );
        let query = [1.0, 1.0, -5.0, -5.0];
        let codes = [1u8, 1u8];
        assert_eq!(pq_asymmetric_distance(&query, &codes, &codebook), 0.0);
    }

    #[test]
    fn pq_distance_sums_squared_error_across_subspaces() {
        let codebook = Codebook::from_blocks(2, vec![(0, vec![vec![0.0, 0.0]]), (1, vec![vec![0.0, 0.0]])]);
        let query = [3.0, 4.0, 1.0, 0.0];
        let codes = [0u8, 0u8];
        // subspace 0: 3^2+4^2=25, subspace 1: 1^2+0^2=1
        assert_eq!(pq_asymmetric_distance(&query, &codes, &codebook), 26.0);
    }
}
