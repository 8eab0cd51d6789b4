//! Dense retriever
//!
//! Embeds the query with an [`Embedder`], searches the [`VectorIndex`] and
//! decorates each hit with its doc id, language label and optional text.

use super::{Retriever, SearchResult};
use crate::config::LanguageTable;
use crate::embedding::Embedder;
use crate::error::{Result, SearchError};
use crate::index::VectorIndex;
use std::sync::Arc;

/// Dense retriever over a built vector index
pub struct DenseRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    languages: LanguageTable,
    corpus_texts: Option<Vec<String>>,
}

impl DenseRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>, languages: LanguageTable) -> Self {
        if embedder.dimension() != index.embedding_dim() {
            tracing::warn!(
                "Embedder dimension {} differs from index dimension {}",
                embedder.dimension(),
                index.embedding_dim()
            );
        }
        if let Some(indexed_model) = index.metadata().model_name.as_deref() {
            if indexed_model != embedder.model_name() {
                tracing::warn!(
                    "Embedder model mismatch: index={}, embedder={}",
                    indexed_model,
                    embedder.model_name()
                );
            }
        }

        Self {
            embedder,
            index,
            languages,
            corpus_texts: None,
        }
    }

    /// Supply the corpus text table, one entry per indexed row
    ///
    /// Without it, texts stored in the index are used.
    pub fn with_corpus_texts(mut self, texts: Vec<String>) -> Self {
        if texts.len() != self.index.num_documents() {
            tracing::warn!(
                "Corpus text table has {} entries for {} indexed documents",
                texts.len(),
                self.index.num_documents()
            );
        }
        self.corpus_texts = Some(texts);
        self
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    fn text_for(&self, row: usize, stored: Option<&str>) -> Option<String> {
        match &self.corpus_texts {
            Some(texts) => texts.get(row).cloned(),
            None => stored.map(String::from),
        }
    }
}

impl Retriever for DenseRetriever {
    fn retrieve(&self, query: &str, top_k: usize, include_text: bool) -> Result<Vec<SearchResult>> {
        let query_embedding = self
            .embedder
            .encode_query(query)
            .map_err(|e| SearchError::RetrievalFailed(format!("failed to embed query: {:#}", e)))?;

        let neighbors = self.index.search(&query_embedding, top_k)?;
        tracing::debug!("Query matched {} documents", neighbors.len());

        neighbors
            .iter()
            .enumerate()
            .map(|(i, neighbor)| {
                let doc = self.index.document_at(neighbor.row)?;
                Ok(SearchResult {
                    rank: i + 1,
                    doc_id: doc.doc_id.to_string(),
                    language: self.languages.resolve(doc.doc_id, doc.language),
                    score: neighbor.score,
                    text: if include_text {
                        self.text_for(neighbor.row, doc.text)
                    } else {
                        None
                    },
                })
            })
            .collect()
    }

    fn name(&self) -> &str {
        "dense"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MrlConfig;
    use crate::embedding::{encode_corpus, EmbeddingConfig, MockEmbedder, TokenEmbedder};
    use crate::index::{embeddings_to_matrix, IndexOptions};
    use tempfile::tempdir;

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("model not loaded")
        }

        fn embed_batch(&self, _texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("model not loaded")
        }

        fn dimension(&self) -> usize {
            64
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn corpus() -> (Vec<String>, Vec<String>, Vec<String>) {
        let ids = vec!["en#1", "hi#2", "doc-3"];
        let languages = vec!["en", "hi", "te"];
        let texts = vec![
            "the capital of india is new delhi",
            "भारत की राजधानी नई दिल्ली है",
            "హైదరాబాద్ తెలంగాణ రాజధాని",
        ];
        (
            ids.into_iter().map(String::from).collect(),
            languages.into_iter().map(String::from).collect(),
            texts.into_iter().map(String::from).collect(),
        )
    }

    fn build_index(embedder: &dyn Embedder, store_texts: bool) -> (tempfile::TempDir, Arc<VectorIndex>) {
        let dir = tempdir().unwrap();
        let (ids, languages, texts) = corpus();
        let embeddings = encode_corpus(embedder, &texts, 2).unwrap();

        let mut index = VectorIndex::new(dir.path(), IndexOptions::default()).unwrap();
        index
            .build(
                embeddings_to_matrix(embeddings).unwrap(),
                ids,
                languages,
                store_texts.then_some(texts),
            )
            .unwrap();
        (dir, Arc::new(index))
    }

    #[test]
    fn test_retrieve_ranks_and_labels() {
        let embedder: Arc<dyn Embedder> = Arc::new(TokenEmbedder::new(EmbeddingConfig::default(), 256));
        let (_dir, index) = build_index(embedder.as_ref(), false);
        let retriever = DenseRetriever::new(embedder, index, MrlConfig::default().language_table());

        let results = retriever.retrieve("नई दिल्ली", 3, true).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].doc_id, "hi#2");
        assert_eq!(results[0].language, "Hindi");
        let ranks: Vec<usize> = results.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        // no text table supplied and none stored
        assert!(results.iter().all(|r| r.text.is_none()));

        let en = results.iter().find(|r| r.doc_id == "en#1").unwrap();
        assert_eq!(en.language, "en");
        let te = results.iter().find(|r| r.doc_id == "doc-3").unwrap();
        assert_eq!(te.language, "Telugu");
    }

    #[test]
    fn test_text_attachment() {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(EmbeddingConfig::default(), 32));
        let (_dir, index) = build_index(embedder.as_ref(), true);
        let (_, _, texts) = corpus();

        let stored = DenseRetriever::new(Arc::clone(&embedder), Arc::clone(&index), LanguageTable::default());
        let hit = &stored.retrieve("the capital of india is new delhi", 1, true).unwrap()[0];
        assert_eq!(hit.doc_id, "en#1");
        assert_eq!(hit.text.as_deref(), Some(texts[0].as_str()));
        assert!(stored.retrieve("anything", 1, false).unwrap()[0].text.is_none());

        let supplied = DenseRetriever::new(embedder, index, LanguageTable::default())
            .with_corpus_texts(vec!["A".into(), "B".into(), "C".into()]);
        let hit = &supplied.retrieve("the capital of india is new delhi", 1, true).unwrap()[0];
        assert_eq!(hit.text.as_deref(), Some("A"));
    }

    #[test]
    fn test_embedder_failure_propagates() {
        let mock = MockEmbedder::new(EmbeddingConfig::default(), 64);
        let (_dir, index) = build_index(&mock, false);
        let retriever = DenseRetriever::new(Arc::new(FailingEmbedder), index, LanguageTable::default());

        let err = retriever.retrieve("query", 5, false).unwrap_err();
        assert!(matches!(err, SearchError::RetrievalFailed(_)));
        assert!(retriever.batch_retrieve(&["a", "b"], 5).is_err());
    }

    #[test]
    fn test_batch_retrieve_preserves_order() {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(EmbeddingConfig::default(), 32));
        let (_dir, index) = build_index(embedder.as_ref(), true);
        let retriever = DenseRetriever::new(embedder, index, LanguageTable::default());
        let (_, _, texts) = corpus();
        let queries: Vec<&str> = texts.iter().rev().map(String::as_str).collect();

        let batches = retriever.batch_retrieve(&queries, 1).unwrap();
        let top: Vec<&str> = batches.iter().map(|b| b[0].doc_id.as_str()).collect();
        assert_eq!(top, vec!["doc-3", "hi#2", "en#1"]);
    }
}
