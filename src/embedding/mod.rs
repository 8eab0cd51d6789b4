//! Embedding generation
//!
//! The index only ever sees L2-normalized vectors, so the similarity used for
//! ranking is a plain dot product. Model-backed embedders live outside this
//! crate and plug in through the [`Embedder`] trait.

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod backends;

// Re-exports
pub use backends::*;

/// Represents an embedding vector
pub type Embedding = Vec<f32>;

/// Configuration for embedding generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name or path
    pub model_name: String,
    /// Whether to normalize embeddings
    pub normalize: bool,
    /// Batch size for corpus encoding
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: "sentence-transformers/paraphrase-multilingual-mpnet-base-v2".to_string(),
            normalize: true,
            batch_size: 32,
        }
    }
}

/// Trait for embedding models
pub trait Embedder: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed multiple texts in batch
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Embed a search query
    ///
    /// Models with asymmetric query/passage encoders override this.
    fn encode_query(&self, query: &str) -> Result<Embedding> {
        self.embed(query)
    }

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Encode a whole corpus in batches of `batch_size`
pub fn encode_corpus(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Embedding>> {
    let batch_size = batch_size.max(1);
    let total_batches = texts.len().div_ceil(batch_size);
    tracing::info!(
        "Encoding corpus of {} documents ({} batches of {})",
        texts.len(),
        total_batches,
        batch_size
    );

    let mut embeddings = Vec::with_capacity(texts.len());
    for (batch_idx, batch) in texts.chunks(batch_size).enumerate() {
        let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
        let batch_embeddings = embedder.embed_batch(&refs)?;
        if batch_embeddings.len() != refs.len() {
            anyhow::bail!(
                "Embedder returned {} vectors for a batch of {} texts",
                batch_embeddings.len(),
                refs.len()
            );
        }
        embeddings.extend(batch_embeddings);

        if (batch_idx + 1) % 50 == 0 {
            tracing::info!("Encoded {}/{} batches", batch_idx + 1, total_batches);
        }
    }

    tracing::info!("Encoding complete: {} embeddings", embeddings.len());
    Ok(embeddings)
}

/// Normalize an embedding vector (L2 normalization)
pub fn normalize_embedding(embedding: &mut [f32]) {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm > 0.0 {
        for val in embedding.iter_mut() {
            *val /= norm;
        }
    }
}

/// Dot product of two equally sized vectors
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Calculate cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot_product(a, b) / (norm_a * norm_b)
    } else {
        0.0
    }
}
