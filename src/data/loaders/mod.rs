//! JSONL dataset loader
//!
//! Expected layout under the data directory:
//!
//! ```text
//! <data>/<language>/corpus.jsonl            {"doc_id", "text"}
//! <data>/<language>/<split>/queries.jsonl   {"query_id", "text"}
//! <data>/<language>/<split>/qrels.jsonl     {"query_id", "doc_id", "relevance"}
//! ```
//!
//! `<language>` is the language key from the configuration (e.g. `hindi`).

use crate::config::{LanguageSpec, MrlConfig};
use crate::data::{build_qrels, Corpus, CorpusRecord, QrelRecord, QueryRecord};
use crate::evaluation::{EvalDataSource, EvalQuery, Qrels};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Read one JSON value per non-empty line
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {:?}", path))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("Invalid record at {:?}:{}", path, line_no + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// Dataset stored as JSONL files per language
#[derive(Debug, Clone)]
pub struct JsonlDataset {
    data_dir: PathBuf,
    languages: Vec<LanguageSpec>,
}

impl JsonlDataset {
    pub fn new(data_dir: impl Into<PathBuf>, languages: Vec<LanguageSpec>) -> Self {
        Self {
            data_dir: data_dir.into(),
            languages,
        }
    }

    pub fn from_config(config: &MrlConfig) -> Self {
        Self::new(&config.data_dir, config.languages.clone())
    }

    fn language(&self, key_or_code: &str) -> Result<&LanguageSpec> {
        self.languages
            .iter()
            .find(|l| l.key == key_or_code || l.code == key_or_code)
            .with_context(|| {
                let known: Vec<&str> = self.languages.iter().map(|l| l.key.as_str()).collect();
                format!("Unknown language '{}'. Valid options: {}", key_or_code, known.join(", "))
            })
    }

    /// Load one language's corpus, tagging each document with its language code
    pub fn load_language_corpus(&self, language: &str) -> Result<Vec<CorpusRecord>> {
        let spec = self.language(language)?;
        let path = self.data_dir.join(&spec.key).join("corpus.jsonl");
        tracing::info!("Loading {} corpus from {:?}", spec.key, path);

        let mut records: Vec<CorpusRecord> = read_jsonl(&path)?;
        for record in records.iter_mut().filter(|r| r.language.is_empty()) {
            record.language = spec.code.clone();
        }
        tracing::info!("Loaded {} {} documents", records.len(), spec.key);
        Ok(records)
    }

    /// Load and concatenate the corpora of `languages`, then sample
    pub fn load_corpus(
        &self,
        languages: &[String],
        sample_size: Option<usize>,
        seed: Option<u64>,
    ) -> Result<Corpus> {
        let mut documents = Vec::new();
        for language in languages {
            documents.extend(self.load_language_corpus(language)?);
        }

        let mut corpus = Corpus::new(documents);
        if let Some(sample_size) = sample_size {
            corpus = corpus.sample(sample_size, seed);
        }
        tracing::info!("Total corpus size: {} documents", corpus.len());
        Ok(corpus)
    }

    pub fn load_queries(&self, language: &str, split: &str) -> Result<Vec<QueryRecord>> {
        let spec = self.language(language)?;
        let path = self.data_dir.join(&spec.key).join(split).join("queries.jsonl");
        read_jsonl(&path)
    }

    pub fn load_qrels(&self, language: &str, split: &str) -> Result<Qrels> {
        let spec = self.language(language)?;
        let path = self.data_dir.join(&spec.key).join(split).join("qrels.jsonl");
        let records: Vec<QrelRecord> = read_jsonl(&path)?;
        Ok(build_qrels(records))
    }
}

impl EvalDataSource for JsonlDataset {
    fn load(&self, language: &str, split: &str) -> Result<(Vec<EvalQuery>, Qrels)> {
        let queries: Vec<EvalQuery> = self
            .load_queries(language, split)?
            .into_iter()
            .map(|q| EvalQuery::new(q.query_id, q.text))
            .collect();
        let qrels = self.load_qrels(language, split)?;
        tracing::info!(
            "Loaded {} queries and {} judged queries for {}/{}",
            queries.len(),
            qrels.len(),
            language,
            split
        );
        Ok((queries, qrels))
    }
}
