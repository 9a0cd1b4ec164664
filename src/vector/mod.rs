//! Vector representation, quantization kinds, and distance functions.
//!
//! Mirrors the teacher's `vector/custom_hnsw/{types,simd_distance}.rs`
//! split: plain data definitions in [`metric`] and [`quantization`], the
//! actual math in [`simd_distance`].

pub mod metric;
pub mod quantization;
pub mod simd_distance;

pub use metric::Metric;
pub use quantization::{Codebook, Quantization, Vector};
