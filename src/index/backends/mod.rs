//! Similarity search backends
//!
//! [`SearchBackend`] is a closed union over the two ways the index can answer
//! a query: an exhaustive dot-product scan ([`ExactBackend`]) and a native
//! structure built by an external library ([`NativeBackend`]). Both return
//! neighbours ordered by descending score with ties broken by row order.

use crate::error::{Result, SearchError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

pub mod exact;
#[cfg(feature = "native")]
pub mod native;

pub use exact::ExactBackend;
#[cfg(feature = "native")]
pub use native::NativeBackend;

/// Which backend answers queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Brute-force scan over the embedding matrix
    #[default]
    Exact,
    /// External similarity library (candle / hnsw_rs)
    Native,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "native" => Ok(Self::Native),
            _ => Err(anyhow::anyhow!(
                "Invalid backend: {}. Valid options: exact, native",
                s
            )),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Native => write!(f, "native"),
        }
    }
}

/// Structure the native backend builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeStructure {
    /// Flat inner-product tensor, exact ranking
    #[default]
    Flat,
    /// HNSW graph, approximate ranking
    Hnsw,
}

/// Configuration for the HNSW structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswParams {
    /// Maximum number of connections per layer
    pub max_connections: usize,
    /// Size of the dynamic candidate list during construction
    pub ef_construction: usize,
    /// Maximum number of layers
    pub max_layers: usize,
    /// Size of the candidate list during search
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            max_connections: 16,
            ef_construction: 200,
            max_layers: 16,
            ef_search: 64,
        }
    }
}

/// Options for the vector index and its backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexOptions {
    /// Backend used to answer queries
    pub backend: BackendKind,
    /// Offload the native flat structure to an accelerator when available
    pub use_gpu: bool,
    /// Structure built by the native backend
    pub native_structure: NativeStructure,
    /// HNSW parameters (native backend, HNSW structure only)
    pub hnsw: HnswParams,
    /// Corpus size from which the exact backend scores rows in parallel
    pub parallel_threshold: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            backend: BackendKind::Exact,
            use_gpu: false,
            native_structure: NativeStructure::Flat,
            hnsw: HnswParams::default(),
            parallel_threshold: 4096,
        }
    }
}

/// A ranked search hit: row of the embedding matrix and its similarity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    pub score: f32,
}

/// Descending score, then ascending row
pub(crate) fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.row.cmp(&b.row))
}

/// Pick the `k` best rows from a full score vector
///
/// Partial selection followed by a sort of the survivors. The comparator is a
/// total order, so the result equals a stable full sort truncated to `k`.
pub(crate) fn select_top_k(scores: Vec<f32>, k: usize) -> Vec<Neighbor> {
    if k == 0 {
        return Vec::new();
    }

    let mut neighbors: Vec<Neighbor> = scores
        .into_iter()
        .enumerate()
        .map(|(row, score)| Neighbor { row, score })
        .collect();

    if k < neighbors.len() {
        neighbors.select_nth_unstable_by(k - 1, compare_neighbors);
        neighbors.truncate(k);
    }
    neighbors.sort_by(compare_neighbors);
    neighbors
}

/// The active similarity backend of a [`VectorIndex`](crate::index::VectorIndex)
pub enum SearchBackend {
    Exact(ExactBackend),
    #[cfg(feature = "native")]
    Native(NativeBackend),
}

impl SearchBackend {
    /// Construct an empty backend of the requested kind
    pub fn new(kind: BackendKind, options: &IndexOptions) -> Result<Self> {
        match kind {
            BackendKind::Exact => Ok(Self::Exact(ExactBackend::new(options.parallel_threshold))),
            #[cfg(feature = "native")]
            BackendKind::Native => Ok(Self::Native(NativeBackend::new(options)?)),
            #[cfg(not(feature = "native"))]
            BackendKind::Native => Err(SearchError::BackendUnavailable(
                "native backend not compiled in; rebuild with --features native".to_string(),
            )),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Exact(_) => BackendKind::Exact,
            #[cfg(feature = "native")]
            Self::Native(_) => BackendKind::Native,
        }
    }

    /// Whether rankings are exhaustive and exact
    pub fn is_exact(&self) -> bool {
        match self {
            Self::Exact(_) => true,
            #[cfg(feature = "native")]
            Self::Native(native) => native.is_exact(),
        }
    }

    /// Build the backend's structure from a normalized embedding matrix
    pub fn build(&mut self, embeddings: &Arc<Array2<f32>>) -> Result<()> {
        match self {
            Self::Exact(exact) => {
                exact.build(Arc::clone(embeddings));
                Ok(())
            }
            #[cfg(feature = "native")]
            Self::Native(native) => native.build(embeddings),
        }
    }

    /// Top `top_k` rows for a query, best first
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Neighbor>> {
        match self {
            Self::Exact(exact) => exact.search(query, top_k),
            #[cfg(feature = "native")]
            Self::Native(native) => native.search(query, top_k),
        }
    }

    /// Write the backend's own artifact to `path`
    ///
    /// The exact backend has nothing beyond the raw matrix, so this is a no-op.
    pub fn serialize(&self, path: &Path) -> Result<()> {
        match self {
            Self::Exact(_) => Ok(()),
            #[cfg(feature = "native")]
            Self::Native(native) => native.serialize(path),
        }
    }

    /// Restore the backend's structure from an artifact written by `serialize`
    ///
    /// Fails for the exact backend, which has no artifact and is restored by
    /// [`build`](Self::build).
    pub fn deserialize(&mut self, path: &Path) -> Result<()> {
        match self {
            Self::Exact(_) => Err(SearchError::LoadFailed(format!(
                "exact backend has no artifact to read from {:?}",
                path
            ))),
            #[cfg(feature = "native")]
            Self::Native(native) => native.deserialize(path),
        }
    }

    /// Number of vectors held by the backend's structure
    pub fn len(&self) -> usize {
        match self {
            Self::Exact(exact) => exact.len(),
            #[cfg(feature = "native")]
            Self::Native(native) => native.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension of the built structure, 0 when unbuilt
    pub fn dimension(&self) -> usize {
        match self {
            Self::Exact(exact) => exact.dimension(),
            #[cfg(feature = "native")]
            Self::Native(native) => native.dimension(),
        }
    }

    /// Drop any built structure
    pub fn clear(&mut self) {
        match self {
            Self::Exact(exact) => exact.clear(),
            #[cfg(feature = "native")]
            Self::Native(native) => native.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_top_k_breaks_ties_by_row() {
        let scores = vec![0.5, 0.9, 0.5, 0.1, 0.9];
        let top = select_top_k(scores, 4);
        let rows: Vec<usize> = top.iter().map(|n| n.row).collect();
        assert_eq!(rows, vec![1, 4, 0, 2]);
    }

    #[test]
    fn test_select_top_k_bounds() {
        assert!(select_top_k(vec![0.1, 0.2], 0).is_empty());
        assert_eq!(select_top_k(vec![0.1, 0.2], 10).len(), 2);
        assert!(select_top_k(Vec::new(), 3).is_empty());
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("exact".parse::<BackendKind>().unwrap(), BackendKind::Exact);
        assert_eq!("NATIVE".parse::<BackendKind>().unwrap(), BackendKind::Native);
        assert!("faiss".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Native.to_string(), "native");
        assert_eq!(serde_json::to_string(&BackendKind::Exact).unwrap(), "\"exact\"");
    }

    #[cfg(not(feature = "native"))]
    #[test]
    fn test_native_unavailable_without_feature() {
        let result = SearchBackend::new(BackendKind::Native, &IndexOptions::default());
        assert!(matches!(result, Err(SearchError::BackendUnavailable(_))));
    }
}
