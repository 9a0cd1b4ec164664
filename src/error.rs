//! Error types for the graph engine, page store, and retriever.

use thiserror::Error;

/// Errors raised by the HNSW graph engine (build/insert/search).
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector dimension {dim} exceeds the maximum of {max} for this page size")]
    DimensionTooLarge { dim: usize, max: usize },

    #[error("vector contains a NaN or infinite component")]
    InvalidVector,

    #[error("invalid search parameters: k={k} ef={ef}")]
    InvalidSearchParams { k: usize, ef: usize },

    #[error("invalid HNSW parameters: {0}")]
    InvalidParams(String),

    #[error("node for slot {0:?} not found")]
    NodeNotFound(crate::slot::Slot),

    #[error(transparent)]
    Retriever(#[from] RetrieverError),
}

/// Errors raised by the page/header layer.
#[derive(Error, Debug)]
pub enum PageError {
    #[error("node of size {size} does not fit on a page of size {page_size}")]
    NodeTooLarge { size: usize, page_size: usize },

    #[error("superblock magic mismatch: expected {expected:#x}, got {actual:#x}")]
    BadMagic { expected: u32, actual: u32 },

    #[error("superblock version mismatch: expected {expected}, got {actual}")]
    BadVersion { expected: u32, actual: u32 },

    #[error("page {0} special area is corrupt")]
    CorruptSpecialArea(u32),

    #[error("invariant violation on block {block} slot {slot:?}: {detail}")]
    InvariantViolation {
        block: u32,
        slot: crate::slot::Slot,
        detail: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by the retriever / buffer-WAL bridge.
#[derive(Error, Debug)]
pub enum RetrieverError {
    #[error("page {0} is not resident and could not be read")]
    PageReadFailed(u32),

    #[error("extra-dirtied budget of {budget} pages exceeded on block {block}")]
    ExtraDirtiedBudgetExceeded { budget: usize, block: u32 },

    #[error("WAL record group finish failed: {0}")]
    WalFinishFailed(String),

    #[error("operation was cancelled by the host")]
    Cancelled,

    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised decoding the external-builder wire protocol
/// (`spec.md` §6 "Wire protocol to external builder").
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("unknown message tag {0:#x}")]
    UnknownTag(u8),

    #[error("message payload of {0} bytes exceeds the {1}-byte frame limit")]
    PayloadTooLarge(usize, usize),

    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised at index-creation/configuration time.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("dimension is required and could not be inferred from the column type")]
    MissingDimension,

    #[error("`m` must be between 1 and 128, got {0}")]
    InvalidM(u32),

    #[error("`ef_construction` must be >= `m` ({m}), got {ef_construction}")]
    InvalidEfConstruction { m: u32, ef_construction: u32 },

    #[error("unknown metric kind: {0}")]
    UnknownMetric(String),

    #[error("unknown quantization kind: {0}")]
    UnknownQuantization(String),

    #[error(transparent)]
    Figment(#[from] figment::Error),
}

/// Top-level error type returned across the public API.
#[derive(Error, Debug)]
pub enum HnswError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Retriever(#[from] RetrieverError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("fatal: {0}")]
    Fatal(String),
}

pub type Result<T, E = HnswError> = std::result::Result<T, E>;
