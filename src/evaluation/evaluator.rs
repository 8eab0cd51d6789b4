//! Per-language retrieval evaluation
//!
//! Each judged query is retrieved at depth `recall_k`, scored with nDCG@K and
//! Recall@K, and folded into a [`LanguageReport`]. Unjudged queries and
//! queries whose retrieval fails are counted separately and never enter the
//! averages. A language whose queries cannot be loaded gets a zeroed report
//! carrying the error, and the remaining languages still run.

use super::metrics::{ndcg_at_k, recall_at_k};
use crate::config::MrlConfig;
use crate::retrieval::Retriever;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// An evaluation query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalQuery {
    pub query_id: String,
    pub text: String,
}

impl EvalQuery {
    pub fn new(query_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            text: text.into(),
        }
    }
}

/// Relevant doc ids per query id
pub type Qrels = HashMap<String, HashSet<String>>;

/// Source of queries and relevance judgments for one language and split
pub trait EvalDataSource: Sync {
    fn load(&self, language: &str, split: &str) -> anyhow::Result<(Vec<EvalQuery>, Qrels)>;
}

/// What happened to a single query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Scored { ndcg: f64, recall: f64 },
    /// No relevance judgments for the query
    Unjudged,
    /// Retrieval failed; the message is kept for the log
    Failed(String),
}

/// Evaluation cut-offs and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSettings {
    pub ndcg_k: usize,
    /// Also the retrieval depth
    pub recall_k: usize,
    /// Evaluate only the first N queries of each language
    pub max_queries: Option<usize>,
    /// Evaluate languages concurrently
    pub parallel: bool,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            ndcg_k: 10,
            recall_k: 100,
            max_queries: None,
            parallel: true,
        }
    }
}

impl EvalSettings {
    pub fn from_config(config: &MrlConfig) -> Self {
        Self {
            ndcg_k: config.ndcg_k,
            recall_k: config.recall_k,
            ..Self::default()
        }
    }

    pub fn with_max_queries(mut self, max_queries: Option<usize>) -> Self {
        self.max_queries = max_queries;
        self
    }
}

/// Averaged metrics for one language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageReport {
    pub language: String,
    pub ndcg_k: usize,
    pub ndcg: f64,
    pub recall_k: usize,
    pub recall: f64,
    /// Queries that were scored and averaged
    pub num_queries: usize,
    pub num_unjudged: usize,
    pub num_failed: usize,
    /// Set when the language could not be evaluated at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LanguageReport {
    fn empty(language: &str, settings: &EvalSettings) -> Self {
        Self {
            language: language.to_string(),
            ndcg_k: settings.ndcg_k,
            ndcg: 0.0,
            recall_k: settings.recall_k,
            recall: 0.0,
            num_queries: 0,
            num_unjudged: 0,
            num_failed: 0,
            error: None,
        }
    }

    /// Zeroed report for a language that failed during setup
    pub fn failed(language: &str, settings: &EvalSettings, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::empty(language, settings)
        }
    }

    /// Fold per-query outcomes into averages over the scored queries
    pub fn from_outcomes(language: &str, settings: &EvalSettings, outcomes: &[QueryOutcome]) -> Self {
        let mut report = Self::empty(language, settings);
        let mut ndcg_sum = 0.0;
        let mut recall_sum = 0.0;

        for outcome in outcomes {
            match outcome {
                QueryOutcome::Scored { ndcg, recall } => {
                    ndcg_sum += ndcg;
                    recall_sum += recall;
                    report.num_queries += 1;
                }
                QueryOutcome::Unjudged => report.num_unjudged += 1,
                QueryOutcome::Failed(_) => report.num_failed += 1,
            }
        }

        if report.num_queries > 0 {
            report.ndcg = ndcg_sum / report.num_queries as f64;
            report.recall = recall_sum / report.num_queries as f64;
        }
        report
    }
}

/// Reports for every evaluated language, in request order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub split: String,
    pub languages: Vec<LanguageReport>,
}

impl EvaluationReport {
    pub fn get(&self, language: &str) -> Option<&LanguageReport> {
        self.languages.iter().find(|r| r.language == language)
    }

    /// Macro-average (nDCG, Recall) over languages with scored queries
    pub fn average(&self) -> Option<(f64, f64)> {
        let scored: Vec<&LanguageReport> =
            self.languages.iter().filter(|r| r.num_queries > 0).collect();
        if scored.is_empty() {
            return None;
        }
        let n = scored.len() as f64;
        Some((
            scored.iter().map(|r| r.ndcg).sum::<f64>() / n,
            scored.iter().map(|r| r.recall).sum::<f64>() / n,
        ))
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ndcg_k, recall_k) = self
            .languages
            .first()
            .map_or((10, 100), |r| (r.ndcg_k, r.recall_k));
        let ndcg_label = format!("nDCG@{}", ndcg_k);
        let recall_label = format!("Recall@{}", recall_k);

        writeln!(f, "{}", "=".repeat(64))?;
        writeln!(f, "RETRIEVAL EVALUATION RESULTS ({} split)", self.split)?;
        writeln!(f, "{}", "=".repeat(64))?;
        writeln!(
            f,
            "{:<15} {:<15} {:<15} {:<15}",
            "Language", ndcg_label, recall_label, "Queries"
        )?;
        writeln!(f, "{}", "-".repeat(64))?;

        for report in &self.languages {
            write!(
                f,
                "{:<15} {:<15.4} {:<15.4} {:<15}",
                report.language.to_uppercase(),
                report.ndcg,
                report.recall,
                report.num_queries
            )?;
            if let Some(error) = &report.error {
                write!(f, " (error: {})", error)?;
            }
            writeln!(f)?;
        }

        if let Some((ndcg, recall)) = self.average() {
            writeln!(f, "{}", "-".repeat(64))?;
            writeln!(f, "{:<15} {:<15.4} {:<15.4}", "AVERAGE", ndcg, recall)?;
        }
        write!(f, "{}", "=".repeat(64))
    }
}

/// Drives retrieval evaluation for one retriever
pub struct Evaluator {
    retriever: Arc<dyn Retriever>,
    settings: EvalSettings,
}

impl Evaluator {
    pub fn new(retriever: Arc<dyn Retriever>, settings: EvalSettings) -> Self {
        Self { retriever, settings }
    }

    /// Score a single query against its judgments
    pub fn evaluate_query(&self, query: &EvalQuery, qrels: &Qrels) -> QueryOutcome {
        let Some(relevant) = qrels.get(&query.query_id) else {
            return QueryOutcome::Unjudged;
        };

        match self.retriever.retrieve(&query.text, self.settings.recall_k, false) {
            Ok(results) => {
                let ranked: Vec<String> = results.into_iter().map(|r| r.doc_id).collect();
                QueryOutcome::Scored {
                    ndcg: ndcg_at_k(&ranked, relevant, self.settings.ndcg_k),
                    recall: recall_at_k(&ranked, relevant, self.settings.recall_k),
                }
            }
            Err(e) => {
                tracing::warn!("Error evaluating query {}: {}", query.query_id, e);
                QueryOutcome::Failed(e.to_string())
            }
        }
    }

    /// Evaluate one language's queries
    pub fn evaluate_language(&self, language: &str, queries: &[EvalQuery], qrels: &Qrels) -> LanguageReport {
        let queries = match self.settings.max_queries {
            Some(max) if max < queries.len() => {
                tracing::info!("Limiting {} evaluation to {} queries", language, max);
                &queries[..max]
            }
            _ => queries,
        };
        tracing::info!(
            "Evaluating {} ({} queries, {} judged)",
            language,
            queries.len(),
            qrels.len()
        );

        let mut outcomes = Vec::with_capacity(queries.len());
        let mut scored = 0;
        for query in queries {
            let outcome = self.evaluate_query(query, qrels);
            if matches!(outcome, QueryOutcome::Scored { .. }) {
                scored += 1;
                if scored % 10 == 0 {
                    tracing::info!("Evaluated {}/{} queries...", scored, queries.len());
                }
            }
            outcomes.push(outcome);
        }

        let report = LanguageReport::from_outcomes(language, &self.settings, &outcomes);
        if report.num_queries == 0 {
            tracing::warn!("No queries were successfully evaluated for {}", language);
        } else {
            tracing::info!(
                "{}: nDCG@{} = {:.4}, Recall@{} = {:.4} over {} queries ({} unjudged, {} failed)",
                language,
                report.ndcg_k,
                report.ndcg,
                report.recall_k,
                report.recall,
                report.num_queries,
                report.num_unjudged,
                report.num_failed
            );
        }
        report
    }

    fn evaluate_from_source(&self, language: &str, source: &dyn EvalDataSource, split: &str) -> LanguageReport {
        match source.load(language, split) {
            Ok((queries, qrels)) => self.evaluate_language(language, &queries, &qrels),
            Err(e) => {
                tracing::error!("Failed to evaluate {}: {:#}", language, e);
                LanguageReport::failed(language, &self.settings, format!("{:#}", e))
            }
        }
    }

    /// Evaluate every language, isolating per-language failures
    pub fn evaluate_all(&self, languages: &[String], source: &dyn EvalDataSource, split: &str) -> EvaluationReport {
        let reports: Vec<LanguageReport> = if self.settings.parallel && languages.len() > 1 {
            languages
                .par_iter()
                .map(|language| self.evaluate_from_source(language, source, split))
                .collect()
        } else {
            languages
                .iter()
                .map(|language| self.evaluate_from_source(language, source, split))
                .collect()
        };

        EvaluationReport {
            split: split.to_string(),
            languages: reports,
        }
    }
}
