//! Corpus, query and relevance-judgment records
//!
//! This module provides the record types read from a dataset directory and the
//! in-memory [`Corpus`] that feeds index building.

use crate::evaluation::Qrels;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

pub mod loaders;

// Re-exports for convenience
pub use loaders::*;

/// A corpus document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub doc_id: String,
    pub text: String,
    /// Language code; filled in by the loader when the file omits it
    #[serde(default)]
    pub language: String,
}

/// A query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query_id: String,
    pub text: String,
}

/// A graded relevance judgment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrelRecord {
    pub query_id: String,
    pub doc_id: String,
    pub relevance: i32,
}

/// Collapse graded judgments into binary relevance sets
///
/// Only judgments with relevance > 0 count.
pub fn build_qrels(records: impl IntoIterator<Item = QrelRecord>) -> Qrels {
    let mut qrels = Qrels::new();
    for record in records.into_iter().filter(|r| r.relevance > 0) {
        qrels.entry(record.query_id).or_default().insert(record.doc_id);
    }
    qrels
}

/// Ordered collection of corpus documents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    pub documents: Vec<CorpusRecord>,
}

impl Corpus {
    pub fn new(documents: Vec<CorpusRecord>) -> Self {
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Keep a random sample of `sample_size` documents, shuffled so languages mix
    ///
    /// A corpus no larger than the sample is left untouched. `seed` makes the
    /// sample reproducible.
    pub fn sample(self, sample_size: usize, seed: Option<u64>) -> Self {
        if sample_size >= self.documents.len() {
            return self;
        }

        tracing::info!(
            "Sampling {} documents from {} total documents",
            sample_size,
            self.documents.len()
        );
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut documents = self.documents;
        documents.shuffle(&mut rng);
        documents.truncate(sample_size);
        Self { documents }
    }

    pub fn texts(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.text.clone()).collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.doc_id.clone()).collect()
    }

    pub fn languages(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.language.clone()).collect()
    }
}
