//! hnswpage - HNSW approximate-nearest-neighbor index embedded in a
//! page-based, WAL-logged storage engine.
//!
//! Two access paths into the same graph engine:
//!
//! - bulk build ([`index::build`]) grows the whole graph in memory
//!   against [`retriever::InMemoryRetriever`], then slices it into pages
//!   in one pass;
//! - incremental insert ([`index::insert`]) mutates a persisted graph
//!   one node at a time through [`index::page_retriever::PageRetriever`],
//!   under [`buffer::BufferManager`]/[`wal::WalManager`] discipline.
//!
//! Both paths drive the identical [`hnsw::graph`] algorithm through the
//! [`retriever::Retriever`] trait; the graph engine never knows which
//! storage backend it is talking to.
//!
//! ## Example
//!
//! ```rust,no_run
//! use hnswpage::buffer::{BufferManager, FileHost};
//! use hnswpage::hnsw::HnswParams;
//! use hnswpage::index::IndexAccessMethod;
//! use hnswpage::row_id::RowId;
//! use hnswpage::vector::{Metric, Quantization, Vector};
//!
//! let host = FileHost::open_at("pages.db", "wal.log").unwrap();
//! let params = HnswParams::new(16, 64, 64).unwrap();
//! host.build_empty(&params, Metric::L2Sq, Quantization::F32, 128).unwrap();
//! host.insert(&params, Metric::L2Sq, RowId::new([0; 6]), Vector::F32(vec![0.0; 128]), 1).unwrap();
//! let mut scan = host.begin_scan(&Vector::F32(vec![0.0; 128]), 10).unwrap();
//! while let Some((_row, _dist)) = scan.get_tuple() {}
//! ```

pub mod buffer;
pub mod cache;
pub mod error;
pub mod external_builder;
pub mod header;
pub mod hnsw;
pub mod index;
pub mod logging;
pub mod metrics;
pub mod page;
pub mod retriever;
pub mod row_id;
pub mod slot;
pub mod vector;
pub mod wal;

pub use error::{HnswError, Result};
pub use row_id::RowId;
pub use slot::Slot;
