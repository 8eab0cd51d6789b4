//! Runtime configuration
//!
//! Everything that used to be process-wide (directories, the language table,
//! default cut-offs) lives in [`MrlConfig`] and is passed into constructors.

use crate::index::{BackendKind, IndexOptions};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Embeddings artifact file name
pub const EMBEDDINGS_FILENAME: &str = "multilingual_index.npz";
/// Metadata artifact file name
pub const METADATA_FILENAME: &str = "document_metadata.json";
/// Native backend artifact file name
pub const NATIVE_INDEX_FILENAME: &str = "native_index.safetensors";

/// A corpus language known to the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSpec {
    /// Key used on the command line and in the data directory (e.g. "hindi")
    pub key: String,
    /// Short language code stored with each document (e.g. "hi")
    pub code: String,
    /// Human-readable display name (e.g. "Hindi")
    pub name: String,
}

impl LanguageSpec {
    pub fn new(key: &str, code: &str, name: &str) -> Self {
        Self {
            key: key.to_string(),
            code: code.to_string(),
            name: name.to_string(),
        }
    }
}

/// Lookup table from language codes to display names
#[derive(Debug, Clone, Default)]
pub struct LanguageTable {
    languages: Vec<LanguageSpec>,
}

impl LanguageTable {
    pub fn new(languages: Vec<LanguageSpec>) -> Self {
        Self { languages }
    }

    /// Display name for a language code, if the code is known
    pub fn display_name(&self, code: &str) -> Option<&str> {
        self.languages
            .iter()
            .find(|l| l.code == code)
            .map(|l| l.name.as_str())
    }

    /// Resolve the label shown for a document
    ///
    /// A known code prefix of the doc_id (the part before `#`) wins over the
    /// stored language. A stored language that is itself a known code is
    /// mapped to its name; anything else passes through unchanged.
    pub fn resolve(&self, doc_id: &str, stored_language: &str) -> String {
        let prefix = doc_id.split('#').next().unwrap_or(doc_id);
        self.display_name(prefix)
            .or_else(|| self.display_name(stored_language))
            .unwrap_or(stored_language)
            .to_string()
    }
}

/// Top-level configuration for index building, search and evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MrlConfig {
    /// Directory holding the index artifacts
    pub index_dir: PathBuf,
    /// Root of the JSONL corpus / query / qrels layout
    pub data_dir: PathBuf,
    /// Supported corpus languages
    pub languages: Vec<LanguageSpec>,
    /// Embedding model name recorded in the index metadata
    pub model_name: String,
    /// Embedding dimension produced by the embedder
    pub embedding_dim: usize,
    /// Default number of documents to retrieve
    pub default_top_k: usize,
    /// Batch size used when encoding the corpus
    pub batch_size: usize,
    /// Number of documents to sample from the corpus (None = full corpus)
    pub corpus_sample_size: Option<usize>,
    /// Seed for corpus sampling (None = entropy)
    pub sample_seed: Option<u64>,
    /// Cut-off for nDCG during evaluation
    pub ndcg_k: usize,
    /// Cut-off for Recall during evaluation (also the retrieval depth)
    pub recall_k: usize,
    /// Vector index options
    pub index: IndexOptions,
}

impl Default for MrlConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("index"),
            data_dir: PathBuf::from("data"),
            languages: vec![
                LanguageSpec::new("hindi", "hi", "Hindi"),
                LanguageSpec::new("bengali", "bn", "Bengali"),
                LanguageSpec::new("telugu", "te", "Telugu"),
            ],
            model_name: "sentence-transformers/paraphrase-multilingual-mpnet-base-v2".to_string(),
            embedding_dim: 768,
            default_top_k: 10,
            batch_size: 32,
            corpus_sample_size: Some(10_000),
            sample_seed: None,
            ndcg_k: 10,
            recall_k: 100,
            index: IndexOptions::default(),
        }
    }
}

impl MrlConfig {
    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Set the index directory
    pub fn with_index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.index_dir = dir.into();
        self
    }

    /// Set the data directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the search backend
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.index.backend = backend;
        self
    }

    /// Request accelerator offload for the native backend
    pub fn with_gpu(mut self, use_gpu: bool) -> Self {
        self.index.use_gpu = use_gpu;
        self
    }

    /// Language code to display name table
    pub fn language_table(&self) -> LanguageTable {
        LanguageTable::new(self.languages.clone())
    }

    /// Look up a language by key or code
    pub fn language(&self, key_or_code: &str) -> Option<&LanguageSpec> {
        self.languages
            .iter()
            .find(|l| l.key == key_or_code || l.code == key_or_code)
    }

    /// All configured language keys, in order
    pub fn language_keys(&self) -> Vec<String> {
        self.languages.iter().map(|l| l.key.clone()).collect()
    }
}
