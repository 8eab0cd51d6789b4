//! Error types for index, search and retrieval operations
//!
//! Glue code (CLI, loaders) works with `anyhow`; everything that touches the
//! index reports one of these variants so callers can tell a missing index
//! from a corrupt one.

use thiserror::Error;

/// Result type alias for index and retrieval operations
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors raised by the vector index, its backends and the retriever
#[derive(Error, Debug)]
pub enum SearchError {
    /// Inconsistent shapes at build or query time
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Search or save called before `build`/`load`
    #[error("index has not been built or loaded")]
    NotBuilt,

    /// Metadata lookup past the number of stored documents
    #[error("row {row} out of range for index with {len} documents")]
    IndexOutOfRange { row: usize, len: usize },

    /// An artifact exists but could not be read back
    #[error("failed to load index: {0}")]
    LoadFailed(String),

    /// The requested native backend could not be constructed
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Embedder or search failure surfaced to a caller
    #[error("retrieval failed: {0}")]
    RetrievalFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SearchError {
    /// Wrap any displayable failure as a load error
    pub fn load_failed(err: impl std::fmt::Display) -> Self {
        Self::LoadFailed(err.to_string())
    }
}
