//! Evaluation metrics
//!
//! Provides ranked-retrieval metrics (nDCG@K, Recall@K) and a per-language
//! evaluator that scores a retriever against relevance judgments.

pub mod evaluator;
pub mod metrics;

// Re-exports
pub use evaluator::*;
pub use metrics::*;
