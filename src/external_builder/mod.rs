//! The wire protocol to an optional external builder (`spec.md` §6
//! "Wire protocol to external builder"): length-prefixed messages —
//! `init`, PQ codebook blocks, `tuple`, an end-marker, then a
//! `(num_nodes, index_size)` response pair followed by the packed byte
//! image to feed into the bulk-build page-placement pass.
//!
//! The remote builder process itself, and any network transport, is the
//! named out-of-scope collaborator (`spec.md` line 11); this module is
//! only the byte framing a reimplementation must accept, exercised here
//! as pure encode/decode against an in-memory buffer.

pub mod frame;

pub use frame::{Message, MAX_PAYLOAD_BYTES};
