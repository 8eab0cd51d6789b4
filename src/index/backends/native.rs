//! Native similarity structures
//!
//! Two structures are available:
//! - a flat inner-product tensor (candle), exact, optionally on CUDA/Metal
//! - an HNSW graph (hnsw_rs), approximate
//!
//! Both serialize to a safetensors file holding the raw vector tensor; the
//! HNSW graph is rebuilt from it on load.

use super::{compare_neighbors, select_top_k, HnswParams, IndexOptions, NativeStructure, Neighbor};
use crate::error::{Result, SearchError};
use candle_core::{DType, Device, Tensor};
use hnsw_rs::hnsw::{Hnsw, Neighbour};
use hnsw_rs::prelude::*;
use ndarray::Array2;
use std::collections::HashMap;
use std::path::Path;

const VECTORS_TENSOR: &str = "vectors";

enum NativeIndex {
    Flat {
        vectors: Tensor,
    },
    Graph {
        hnsw: Hnsw<'static, f32, DistCosine>,
        /// CPU copy kept for serialization
        vectors: Tensor,
    },
}

/// Backend delegating to candle tensors or an hnsw_rs graph
pub struct NativeBackend {
    structure: NativeStructure,
    hnsw_params: HnswParams,
    device: Device,
    index: Option<NativeIndex>,
    num_vectors: usize,
    dimension: usize,
}

impl NativeBackend {
    pub fn new(options: &IndexOptions) -> Result<Self> {
        let device = match options.native_structure {
            NativeStructure::Flat => select_device(options.use_gpu),
            NativeStructure::Hnsw => {
                if options.use_gpu {
                    tracing::warn!("HNSW structure runs on CPU only; ignoring GPU request");
                }
                Device::Cpu
            }
        };

        Ok(Self {
            structure: options.native_structure,
            hnsw_params: options.hnsw.clone(),
            device,
            index: None,
            num_vectors: 0,
            dimension: 0,
        })
    }

    /// Flat structures rank exactly; HNSW graphs do not
    pub fn is_exact(&self) -> bool {
        self.structure == NativeStructure::Flat
    }

    /// Whether the flat structure lives on an accelerator
    pub fn on_accelerator(&self) -> bool {
        !self.device.is_cpu()
    }

    pub fn build(&mut self, embeddings: &Array2<f32>) -> Result<()> {
        let (rows, cols) = embeddings.dim();
        let data: Vec<f32> = embeddings.iter().copied().collect();
        let vectors = Tensor::from_vec(data, (rows, cols), &Device::Cpu)
            .map_err(|e| SearchError::BackendUnavailable(format!("tensor creation failed: {}", e)))?;
        self.install(vectors)
    }

    fn install(&mut self, vectors: Tensor) -> Result<()> {
        let (rows, cols) = vectors
            .dims2()
            .map_err(|e| SearchError::BackendUnavailable(e.to_string()))?;

        let index = match self.structure {
            NativeStructure::Flat => {
                let vectors = match vectors.to_device(&self.device) {
                    Ok(on_device) => on_device,
                    Err(e) => {
                        tracing::warn!("Failed to place index on {:?}: {}. Falling back to CPU.", self.device, e);
                        self.device = Device::Cpu;
                        vectors
                    }
                };
                tracing::info!("Native flat index created ({} vectors, dim {})", rows, cols);
                NativeIndex::Flat { vectors }
            }
            NativeStructure::Hnsw => {
                let rows_data: Vec<Vec<f32>> = vectors
                    .to_vec2::<f32>()
                    .map_err(|e| SearchError::BackendUnavailable(e.to_string()))?;

                let mut hnsw: Hnsw<'static, f32, DistCosine> = Hnsw::new(
                    self.hnsw_params.max_connections,
                    rows,
                    self.hnsw_params.max_layers,
                    self.hnsw_params.ef_construction,
                    DistCosine,
                );
                let points: Vec<(&Vec<f32>, usize)> = rows_data.iter().zip(0..rows).collect();
                hnsw.parallel_insert(&points);
                hnsw.set_searching_mode(true);

                tracing::info!("Native HNSW index created ({} vectors, dim {})", rows, cols);
                NativeIndex::Graph { hnsw, vectors }
            }
        };

        self.index = Some(index);
        self.num_vectors = rows;
        self.dimension = cols;
        Ok(())
    }

    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Neighbor>> {
        let index = self.index.as_ref().ok_or(SearchError::NotBuilt)?;
        if query.len() != self.dimension {
            return Err(SearchError::ShapeMismatch(format!(
                "query has dimension {}, index has {}",
                query.len(),
                self.dimension
            )));
        }
        let top_k = top_k.min(self.num_vectors);

        match index {
            NativeIndex::Flat { vectors } => {
                let scores = Tensor::from_slice(query, (self.dimension, 1), &self.device)
                    .and_then(|q| vectors.matmul(&q))
                    .and_then(|s| s.squeeze(1))
                    .and_then(|s| s.to_vec1::<f32>())
                    .map_err(|e| SearchError::RetrievalFailed(format!("native search failed: {}", e)))?;
                Ok(select_top_k(scores, top_k))
            }
            NativeIndex::Graph { hnsw, .. } => {
                let ef_search = self.hnsw_params.ef_search.max(top_k);
                let found: Vec<Neighbour> = hnsw.search(query, top_k, ef_search);
                let mut neighbors: Vec<Neighbor> = found
                    .iter()
                    .map(|n| Neighbor {
                        row: n.d_id,
                        // DistCosine is 1 - cosine
                        score: 1.0 - n.distance,
                    })
                    .collect();
                neighbors.sort_by(compare_neighbors);
                Ok(neighbors)
            }
        }
    }

    pub fn serialize(&self, path: &Path) -> Result<()> {
        let index = self.index.as_ref().ok_or(SearchError::NotBuilt)?;
        let vectors = match index {
            NativeIndex::Flat { vectors } | NativeIndex::Graph { vectors, .. } => vectors,
        };

        let cpu_vectors = vectors.to_device(&Device::Cpu).map_err(io_error)?;
        let tensors = HashMap::from([(VECTORS_TENSOR.to_string(), cpu_vectors)]);
        candle_core::safetensors::save(&tensors, path).map_err(io_error)?;

        tracing::debug!("Native index serialized to {:?}", path);
        Ok(())
    }

    pub fn deserialize(&mut self, path: &Path) -> Result<()> {
        let mut tensors =
            candle_core::safetensors::load(path, &Device::Cpu).map_err(SearchError::load_failed)?;
        let vectors = tensors.remove(VECTORS_TENSOR).ok_or_else(|| {
            SearchError::LoadFailed(format!("{:?} has no '{}' tensor", path, VECTORS_TENSOR))
        })?;
        if vectors.dtype() != DType::F32 {
            return Err(SearchError::LoadFailed(format!(
                "expected f32 vectors, found {:?}",
                vectors.dtype()
            )));
        }
        vectors.dims2().map_err(SearchError::load_failed)?;

        self.install(vectors)
    }

    pub fn len(&self) -> usize {
        self.num_vectors
    }

    pub fn is_empty(&self) -> bool {
        self.num_vectors == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn clear(&mut self) {
        self.index = None;
        self.num_vectors = 0;
        self.dimension = 0;
    }
}

fn io_error(e: candle_core::Error) -> SearchError {
    SearchError::Io(std::io::Error::other(e.to_string()))
}

/// Pick the accelerator for the flat structure, degrading to CPU
fn select_device(use_gpu: bool) -> Device {
    if !use_gpu {
        return Device::Cpu;
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                tracing::info!("Native index will use CUDA device 0");
                return device;
            }
            Err(e) => tracing::warn!("CUDA initialization failed: {}", e),
        }
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                tracing::info!("Native index will use Metal device 0");
                return device;
            }
            Err(e) => tracing::warn!("Metal initialization failed: {}", e),
        }
    }

    #[cfg(not(any(feature = "cuda", feature = "metal")))]
    tracing::warn!("GPU requested but compiled without 'cuda' or 'metal' feature");

    tracing::warn!("Falling back to CPU for the native index");
    Device::Cpu
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::normalize_embedding;
    use crate::index::backends::ExactBackend;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn unit_matrix(rows: usize, cols: usize) -> Array2<f32> {
        let mut state: u64 = 42;
        let mut data = Vec::with_capacity(rows * cols);
        for _ in 0..rows {
            let mut row: Vec<f32> = (0..cols)
                .map(|_| {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                    ((state >> 33) % 2000) as f32 / 1000.0 - 1.0
                })
                .collect();
            normalize_embedding(&mut row);
            data.extend(row);
        }
        Array2::from_shape_vec((rows, cols), data).unwrap()
    }

    fn options(structure: NativeStructure) -> IndexOptions {
        IndexOptions {
            native_structure: structure,
            ..IndexOptions::default()
        }
    }

    #[test]
    fn test_flat_matches_exact_backend() {
        let matrix = unit_matrix(200, 32);
        let query: Vec<f32> = matrix.row(17).to_vec();

        let mut native = NativeBackend::new(&options(NativeStructure::Flat)).unwrap();
        native.build(&matrix).unwrap();
        assert!(native.is_exact());

        let mut exact = ExactBackend::new(usize::MAX);
        exact.build(Arc::new(matrix));

        let native_hits = native.search(&query, 10).unwrap();
        let exact_hits = exact.search(&query, 10).unwrap();

        let native_rows: HashSet<usize> = native_hits.iter().map(|n| n.row).collect();
        let exact_rows: HashSet<usize> = exact_hits.iter().map(|n| n.row).collect();
        assert_eq!(native_rows, exact_rows);
        assert_eq!(native_hits[0].row, 17);
        for (a, b) in native_hits.iter().zip(exact_hits.iter()) {
            assert!((a.score - b.score).abs() < 1e-4);
        }
    }

    #[test]
    fn test_hnsw_finds_identical_vector() {
        let matrix = unit_matrix(100, 16);
        let query: Vec<f32> = matrix.row(3).to_vec();

        let mut native = NativeBackend::new(&options(NativeStructure::Hnsw)).unwrap();
        native.build(&matrix).unwrap();
        assert!(!native.is_exact());

        let hits = native.search(&query, 5).unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].row, 3);
        assert!((hits[0].score - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_serialize_round_trip() {
        let matrix = unit_matrix(20, 8);
        let dir = tempdir().unwrap();
        let path = dir.path().join("native.safetensors");

        let mut native = NativeBackend::new(&options(NativeStructure::Flat)).unwrap();
        native.build(&matrix).unwrap();
        native.serialize(&path).unwrap();

        let mut restored = NativeBackend::new(&options(NativeStructure::Flat)).unwrap();
        restored.deserialize(&path).unwrap();
        assert_eq!(restored.len(), 20);
        assert_eq!(restored.dimension(), 8);

        let query: Vec<f32> = matrix.row(5).to_vec();
        assert_eq!(
            native.search(&query, 3).unwrap(),
            restored.search(&query, 3).unwrap()
        );
    }

    #[test]
    fn test_gpu_request_degrades_to_cpu() {
        let opts = IndexOptions {
            use_gpu: true,
            ..IndexOptions::default()
        };
        let mut native = NativeBackend::new(&opts).unwrap();
        native.build(&unit_matrix(4, 4)).unwrap();
        assert_eq!(native.len(), 4);
        #[cfg(not(any(feature = "cuda", feature = "metal")))]
        assert!(!native.on_accelerator());
    }

    #[test]
    fn test_deserialize_garbage_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.safetensors");
        std::fs::write(&path, b"not a safetensors file").unwrap();

        let mut native = NativeBackend::new(&options(NativeStructure::Flat)).unwrap();
        assert!(matches!(native.deserialize(&path), Err(SearchError::LoadFailed(_))));
    }
}
