//! Model-free embedders
//!
//! Both embedders are deterministic and need no model files, which makes them
//! useful for smoke-testing the index and for reproducible evaluation runs.

use crate::embedding::{normalize_embedding, Embedder, Embedding, EmbeddingConfig};
use anyhow::Result;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

/// Mock embedder for testing (generates random but deterministic embeddings)
pub struct MockEmbedder {
    config: EmbeddingConfig,
    dimension: usize,
}

impl MockEmbedder {
    /// Create a new mock embedder
    pub fn new(config: EmbeddingConfig, dimension: usize) -> Self {
        Self { config, dimension }
    }

    fn generate_embedding(&self, text: &str) -> Embedding {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut state = hasher.finish();

        let mut embedding: Embedding = (0..self.dimension)
            .map(|_| {
                // LCG step
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) % 10000) as f32 / 10000.0 - 0.5
            })
            .collect();

        if self.config.normalize {
            normalize_embedding(&mut embedding);
        }
        embedding
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(self.generate_embedding(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|&text| self.generate_embedding(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

/// Hashed bag-of-words embedder
///
/// Words are segmented on Unicode word boundaries, so Devanagari, Bengali and
/// Telugu text tokenizes the same way Latin text does. Texts sharing words
/// end up with positive similarity.
pub struct TokenEmbedder {
    config: EmbeddingConfig,
    dimension: usize,
}

impl TokenEmbedder {
    /// Create a new token-based embedder
    pub fn new(config: EmbeddingConfig, dimension: usize) -> Self {
        Self { config, dimension }
    }

    fn generate_embedding(&self, text: &str) -> Embedding {
        let mut embedding = vec![0.0; self.dimension];
        if self.dimension == 0 {
            return embedding;
        }

        let tokens: Vec<String> = text.unicode_words().map(|w| w.to_lowercase()).collect();
        if tokens.is_empty() {
            return embedding;
        }

        for token in &tokens {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let idx = (hasher.finish() as usize) % self.dimension;
            embedding[idx] += 1.0;
        }

        let total_tokens = tokens.len() as f32;
        for val in embedding.iter_mut() {
            *val /= total_tokens;
        }

        if self.config.normalize {
            normalize_embedding(&mut embedding);
        }

        embedding
    }
}

impl Embedder for TokenEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(self.generate_embedding(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|&text| self.generate_embedding(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

/// Create an embedder by name ("token" or "mock")
pub fn create_embedder(
    backend: &str,
    config: EmbeddingConfig,
    dimension: usize,
) -> Result<Arc<dyn Embedder>> {
    match backend {
        "mock" => Ok(Arc::new(MockEmbedder::new(config, dimension))),
        "token" => Ok(Arc::new(TokenEmbedder::new(config, dimension))),
        _ => anyhow::bail!("Unknown embedder '{}'. Valid options: token, mock", backend),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::dot_product;

    #[test]
    fn test_mock_embedder() {
        let config = EmbeddingConfig {
            model_name: "test-model".to_string(),
            normalize: true,
            ..Default::default()
        };
        let embedder = MockEmbedder::new(config, 128);

        let emb = embedder.embed("Hello, world!").unwrap();
        assert_eq!(emb.len(), 128);
        assert_eq!(emb, embedder.embed("Hello, world!").unwrap());
        assert_ne!(emb, embedder.embed("Different text").unwrap());

        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_token_embedder_overlap() {
        let embedder = TokenEmbedder::new(EmbeddingConfig::default(), 256);

        let emb = embedder.embed("The quick brown fox jumps over the lazy dog").unwrap();
        let emb2 = embedder.embed("the QUICK brown fox").unwrap();
        assert_eq!(emb.len(), 256);
        assert!(dot_product(&emb, &emb2) > 0.1);
    }

    #[test]
    fn test_token_embedder_non_latin() {
        let embedder = TokenEmbedder::new(EmbeddingConfig::default(), 256);

        let a = embedder.embed("भारत की राजधानी नई दिल्ली है").unwrap();
        let b = embedder.embed("नई दिल्ली").unwrap();
        assert!(dot_product(&a, &b) > 0.1);

        let empty = embedder.embed("   ").unwrap();
        assert!(empty.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_create_embedder() {
        let embedder = create_embedder("mock", EmbeddingConfig::default(), 64).unwrap();
        let embeddings = embedder.embed_batch(&["text1", "text2", "text3"]).unwrap();
        assert_eq!(embeddings.len(), 3);
        assert_eq!(embeddings[0].len(), 64);

        assert!(create_embedder("onnx", EmbeddingConfig::default(), 64).is_err());
    }
}
