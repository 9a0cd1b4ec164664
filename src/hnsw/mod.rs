//! The HNSW graph engine: parameters, the in-memory node
//! representation, and the build/insert/search algorithm. Mirrors the
//! teacher's `vector/custom_hnsw/{types,index}.rs` split.

pub mod graph;
pub mod node;
pub mod params;

pub use graph::{insert, search, Candidate, GraphState};
pub use node::Node;
pub use params::HnswParams;
