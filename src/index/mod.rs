//! Vector index over normalized document embeddings
//!
//! A [`VectorIndex`] owns the embedding matrix, the per-document metadata
//! (doc ids, languages, optional texts) and the active [`SearchBackend`].
//! It persists as three directory-scoped artifacts:
//!
//! - `multilingual_index.npz`: the embedding matrix
//! - `document_metadata.json`: ids, languages, texts and shape information
//! - `native_index.safetensors`: the native backend's structure (native only)

use crate::config::{MrlConfig, EMBEDDINGS_FILENAME, METADATA_FILENAME, NATIVE_INDEX_FILENAME};
use crate::embedding::Embedding;
use crate::error::{Result, SearchError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod backends;
mod storage;

pub use backends::{
    BackendKind, ExactBackend, HnswParams, IndexOptions, NativeStructure, Neighbor, SearchBackend,
};
#[cfg(feature = "native")]
pub use backends::NativeBackend;

/// Persisted description of the indexed documents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub doc_ids: Vec<String>,
    pub languages: Vec<String>,
    /// Empty when the index was built without texts
    #[serde(default)]
    pub doc_texts: Vec<String>,
    pub num_documents: usize,
    pub embedding_dim: usize,
    #[serde(default)]
    pub backend: BackendKind,
    /// Structure built by the native backend; absent for exact indexes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_structure: Option<NativeStructure>,
    /// SHA-256 of the embedding matrix this metadata was saved with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl IndexMetadata {
    /// Check the metadata against the embedding matrix it was saved with
    pub fn validate(&self, embeddings: &Array2<f32>) -> Result<()> {
        let (rows, cols) = embeddings.dim();
        if self.num_documents != rows
            || self.doc_ids.len() != rows
            || self.languages.len() != rows
        {
            return Err(SearchError::LoadFailed(format!(
                "metadata describes {} documents ({} ids, {} languages) but embeddings have {} rows",
                self.num_documents,
                self.doc_ids.len(),
                self.languages.len(),
                rows
            )));
        }
        if self.embedding_dim != cols {
            return Err(SearchError::LoadFailed(format!(
                "metadata embedding_dim {} does not match embeddings width {}",
                self.embedding_dim, cols
            )));
        }
        if !self.doc_texts.is_empty() && self.doc_texts.len() != rows {
            return Err(SearchError::LoadFailed(format!(
                "metadata has {} texts for {} documents",
                self.doc_texts.len(),
                rows
            )));
        }
        if let Some(expected) = &self.fingerprint {
            let actual = embeddings_fingerprint(embeddings);
            if *expected != actual {
                return Err(SearchError::LoadFailed(format!(
                    "embeddings fingerprint {} does not match metadata fingerprint {}",
                    actual, expected
                )));
            }
        }
        Ok(())
    }
}

/// Metadata of one indexed document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentInfo<'a> {
    pub doc_id: &'a str,
    pub language: &'a str,
    pub text: Option<&'a str>,
}

/// Queryable store of document embeddings
///
/// `build` and `load` take `&mut self`, `search` takes `&self`, so a build in
/// progress can never overlap a search on the same instance. Share a built
/// index across threads behind an `Arc`.
pub struct VectorIndex {
    index_dir: PathBuf,
    options: IndexOptions,
    backend: SearchBackend,
    embeddings: Option<Arc<Array2<f32>>>,
    metadata: IndexMetadata,
}

impl VectorIndex {
    /// Create an empty index rooted at `index_dir`
    ///
    /// Fails with `BackendUnavailable` if the configured backend cannot be
    /// constructed.
    pub fn new(index_dir: impl Into<PathBuf>, options: IndexOptions) -> Result<Self> {
        let backend = SearchBackend::new(options.backend, &options)?;
        Ok(Self {
            index_dir: index_dir.into(),
            options,
            backend,
            embeddings: None,
            metadata: IndexMetadata::default(),
        })
    }

    pub fn from_config(config: &MrlConfig) -> Result<Self> {
        let mut index = Self::new(&config.index_dir, config.index.clone())?;
        index.set_model_name(&config.model_name);
        Ok(index)
    }

    /// Record the embedding model that produced the vectors
    pub fn set_model_name(&mut self, model_name: impl Into<String>) {
        self.metadata.model_name = Some(model_name.into());
    }

    /// Replace the index contents with a new set of documents
    ///
    /// `texts` is all-or-nothing: `None` (or an empty vector) stores no
    /// texts, otherwise it must have one entry per document.
    pub fn build(
        &mut self,
        embeddings: Array2<f32>,
        doc_ids: Vec<String>,
        languages: Vec<String>,
        texts: Option<Vec<String>>,
    ) -> Result<()> {
        let (rows, cols) = embeddings.dim();
        if rows == 0 || cols == 0 {
            return Err(SearchError::ShapeMismatch(format!(
                "cannot build an index from a {} x {} matrix",
                rows, cols
            )));
        }
        if doc_ids.len() != rows || languages.len() != rows {
            return Err(SearchError::ShapeMismatch(format!(
                "{} doc ids and {} languages for {} embeddings",
                doc_ids.len(),
                languages.len(),
                rows
            )));
        }
        let texts = texts.unwrap_or_default();
        if !texts.is_empty() && texts.len() != rows {
            return Err(SearchError::ShapeMismatch(format!(
                "{} texts for {} embeddings",
                texts.len(),
                rows
            )));
        }

        tracing::info!(
            "Building {} index: {} documents, dimension {}",
            self.options.backend,
            rows,
            cols
        );

        // Build into a fresh backend so a failure leaves the old state intact
        let embeddings = Arc::new(embeddings);
        let mut backend = SearchBackend::new(self.options.backend, &self.options)?;
        backend.build(&embeddings)?;
        let native_structure =
            (backend.kind() == BackendKind::Native).then_some(self.options.native_structure);

        self.metadata = IndexMetadata {
            doc_ids,
            languages,
            doc_texts: texts,
            num_documents: rows,
            embedding_dim: cols,
            backend: backend.kind(),
            native_structure,
            fingerprint: Some(embeddings_fingerprint(&embeddings)),
            model_name: self.metadata.model_name.take(),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        self.embeddings = Some(embeddings);
        self.backend = backend;

        tracing::info!("Index built ({} documents)", rows);
        Ok(())
    }

    /// Persist all artifacts to the index directory
    pub fn save(&self) -> Result<()> {
        let embeddings = self.embeddings.as_ref().ok_or(SearchError::NotBuilt)?;

        storage::write_embeddings(&self.embeddings_path(), embeddings)?;
        if self.backend.kind() == BackendKind::Native {
            storage::write_atomically(&self.native_path(), |tmp| {
                self.backend.serialize(tmp.path())
            })?;
        }
        // Metadata last: an index only counts as present once it exists
        storage::write_metadata(&self.metadata_path(), &self.metadata)?;

        tracing::info!(
            "Index saved to {:?} ({} documents, {} backend)",
            self.index_dir,
            self.metadata.num_documents,
            self.backend.kind()
        );
        Ok(())
    }

    /// Open the index stored in `index_dir`
    ///
    /// Returns `Ok(None)` when the artifacts are absent. The backend and
    /// native structure recorded in the metadata win over `options`; a
    /// missing or unreadable native artifact is rebuilt from the embeddings.
    pub fn open(index_dir: impl Into<PathBuf>, options: &IndexOptions) -> Result<Option<Self>> {
        let index_dir = index_dir.into();
        let embeddings_path = index_dir.join(EMBEDDINGS_FILENAME);
        let metadata_path = index_dir.join(METADATA_FILENAME);
        if !embeddings_path.exists() || !metadata_path.exists() {
            tracing::debug!("No index found in {:?}", index_dir);
            return Ok(None);
        }

        let metadata = storage::read_metadata(&metadata_path).map_err(as_load_failure)?;
        let embeddings = storage::read_embeddings(&embeddings_path).map_err(as_load_failure)?;
        metadata.validate(&embeddings)?;

        let mut options = options.clone();
        if metadata.backend != options.backend {
            tracing::warn!(
                "Index in {:?} was saved with the {} backend; switching from {}",
                index_dir,
                metadata.backend,
                options.backend
            );
            options.backend = metadata.backend;
        }
        if options.backend == BackendKind::Native {
            let recorded = metadata.native_structure.unwrap_or_default();
            if recorded != options.native_structure {
                tracing::warn!(
                    "Native index in {:?} was saved as {:?}; switching from {:?}",
                    index_dir,
                    recorded,
                    options.native_structure
                );
                options.native_structure = recorded;
            }
        }

        let embeddings = Arc::new(embeddings);
        let mut backend = SearchBackend::new(options.backend, &options)?;
        if options.backend == BackendKind::Native {
            restore_native(&mut backend, &index_dir.join(NATIVE_INDEX_FILENAME), &embeddings)?;
        } else {
            backend.build(&embeddings)?;
        }

        tracing::info!(
            "Loaded index from {:?}: {} documents, dimension {}, {} backend",
            index_dir,
            metadata.num_documents,
            metadata.embedding_dim,
            options.backend
        );

        Ok(Some(Self {
            index_dir,
            options,
            backend,
            embeddings: Some(embeddings),
            metadata,
        }))
    }

    /// Load the artifacts from this index's directory
    ///
    /// Returns `false` when nothing has been saved yet. On error the index is
    /// left unbuilt.
    pub fn load(&mut self) -> Result<bool> {
        match Self::open(&self.index_dir, &self.options) {
            Ok(Some(opened)) => {
                *self = opened;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    /// Top `top_k` rows for a normalized query vector, best first
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Neighbor>> {
        if self.embeddings.is_none() {
            return Err(SearchError::NotBuilt);
        }
        if query.len() != self.metadata.embedding_dim {
            return Err(SearchError::ShapeMismatch(format!(
                "query has dimension {}, index has {}",
                query.len(),
                self.metadata.embedding_dim
            )));
        }

        let top_k = top_k.min(self.metadata.num_documents);
        if top_k == 0 {
            return Ok(Vec::new());
        }
        self.backend.search(query, top_k)
    }

    pub fn document_at(&self, row: usize) -> Result<DocumentInfo<'_>> {
        let len = self.metadata.num_documents;
        if row >= len {
            return Err(SearchError::IndexOutOfRange { row, len });
        }
        Ok(DocumentInfo {
            doc_id: &self.metadata.doc_ids[row],
            language: &self.metadata.languages[row],
            text: self.metadata.doc_texts.get(row).map(String::as_str),
        })
    }

    /// Whether saved artifacts are present (no parsing)
    pub fn exists_on_disk(&self) -> bool {
        self.embeddings_path().exists() && self.metadata_path().exists()
    }

    pub fn is_built(&self) -> bool {
        self.embeddings.is_some()
    }

    pub fn num_documents(&self) -> usize {
        self.metadata.num_documents
    }

    pub fn embedding_dim(&self) -> usize {
        self.metadata.embedding_dim
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Whether searches are exhaustive and exact
    pub fn is_exact(&self) -> bool {
        self.backend.is_exact()
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    pub fn embeddings(&self) -> Option<&Array2<f32>> {
        self.embeddings.as_deref()
    }

    /// Stored document texts, if the index was built with them
    pub fn texts(&self) -> Option<&[String]> {
        if self.metadata.doc_texts.is_empty() {
            None
        } else {
            Some(&self.metadata.doc_texts)
        }
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    fn reset(&mut self) {
        let model_name = self.metadata.model_name.take();
        self.embeddings = None;
        self.metadata = IndexMetadata {
            model_name,
            ..IndexMetadata::default()
        };
        self.backend.clear();
    }

    fn embeddings_path(&self) -> PathBuf {
        self.index_dir.join(EMBEDDINGS_FILENAME)
    }

    fn metadata_path(&self) -> PathBuf {
        self.index_dir.join(METADATA_FILENAME)
    }

    fn native_path(&self) -> PathBuf {
        self.index_dir.join(NATIVE_INDEX_FILENAME)
    }
}

/// Deserialize the native structure, rebuilding it from the embeddings when
/// the artifact is missing, unreadable, or out of step with the matrix
fn restore_native(
    backend: &mut SearchBackend,
    path: &Path,
    embeddings: &Arc<Array2<f32>>,
) -> Result<()> {
    let (rows, cols) = embeddings.dim();
    if path.exists() {
        match backend.deserialize(path) {
            Ok(()) if backend.len() == rows && backend.dimension() == cols => {
                tracing::debug!("Native structure restored from {:?}", path);
                return Ok(());
            }
            Ok(()) => tracing::warn!(
                "Native artifact {:?} holds {} x {} vectors, expected {} x {}; rebuilding",
                path,
                backend.len(),
                backend.dimension(),
                rows,
                cols
            ),
            Err(e) => tracing::warn!("Failed to read native artifact {:?}: {}; rebuilding", path, e),
        }
    } else {
        tracing::warn!("Native artifact {:?} missing; rebuilding from embeddings", path);
    }
    backend.build(embeddings)
}

fn as_load_failure(err: SearchError) -> SearchError {
    match err {
        SearchError::LoadFailed(_) => err,
        other => SearchError::LoadFailed(other.to_string()),
    }
}

/// Hex SHA-256 over the matrix shape and its values in row-major order
pub fn embeddings_fingerprint(embeddings: &Array2<f32>) -> String {
    let (rows, cols) = embeddings.dim();
    let mut hasher = Sha256::new();
    hasher.update((rows as u64).to_le_bytes());
    hasher.update((cols as u64).to_le_bytes());
    for value in embeddings.iter() {
        hasher.update(value.to_le_bytes());
    }

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}

/// Stack embedding vectors into a row-major matrix
pub fn embeddings_to_matrix(embeddings: Vec<Embedding>) -> Result<Array2<f32>> {
    let rows = embeddings.len();
    let cols = embeddings.first().map_or(0, Vec::len);
    if let Some((i, bad)) = embeddings.iter().enumerate().find(|(_, e)| e.len() != cols) {
        return Err(SearchError::ShapeMismatch(format!(
            "embedding {} has dimension {}, expected {}",
            i,
            bad.len(),
            cols
        )));
    }

    let flat: Vec<f32> = embeddings.into_iter().flatten().collect();
    Array2::from_shape_vec((rows, cols), flat).map_err(|e| SearchError::ShapeMismatch(e.to_string()))
}
