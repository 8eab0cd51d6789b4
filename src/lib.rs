//! # Multilingual Retrieval Lab (MRL)
//!
//! Dense cross-lingual retrieval over a multilingual corpus, with retrieval
//! quality measured by nDCG@K and Recall@K.
//!
//! ## Overview
//!
//! Documents are embedded into unit-length vectors and stored in a
//! [`VectorIndex`](index::VectorIndex). Queries are embedded the same way and
//! ranked by dot product (cosine similarity), either by an exhaustive scan or
//! by a native similarity structure (candle tensors or an HNSW graph).
//!
//! ## Architecture
//!
//! - `config` - Directories, language table and defaults
//! - `error` - Error taxonomy for index and retrieval
//! - `embedding` - Embedder trait and model-free embedders
//! - `index` - Vector index, search backends and persistence
//! - `retrieval` - Query-to-results retrievers
//! - `evaluation` - nDCG/Recall metrics and per-language evaluation
//! - `data` - JSONL corpus, query and qrels loading
//! - `cli` - Command-line interface

// Core modules
pub mod config;
pub mod error;
pub mod embedding;
pub mod index;
pub mod retrieval;
pub mod evaluation;
pub mod data;
pub mod cli;

// Re-export commonly used types
pub use error::{Result, SearchError};
pub use index::VectorIndex;
