//! The index layer: configuration, bulk build, incremental insert, and
//! K-NN scan, wired together behind [`access_method::IndexAccessMethod`]
//! (`spec.md` §6 "Host-index access method contract").

pub mod access_method;
pub mod build;
pub mod insert;
pub mod options;
pub mod page_retriever;
pub mod scan;
pub mod validate;

pub use access_method::IndexAccessMethod;
pub use build::BuildStats;
pub use insert::TransactionState;
pub use options::IndexOptions;
pub use scan::ScanState;
pub use validate::{validate, ValidationReport, Violation};
