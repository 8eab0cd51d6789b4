//! Exhaustive dot-product search

use super::{select_top_k, Neighbor};
use crate::error::{Result, SearchError};
use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayView1, Axis};
use std::sync::Arc;

/// Brute-force backend over the shared embedding matrix
///
/// Vectors are unit-normalized, so the dot product is the cosine similarity.
#[derive(Debug, Clone)]
pub struct ExactBackend {
    matrix: Option<Arc<Array2<f32>>>,
    parallel_threshold: usize,
}

impl ExactBackend {
    pub fn new(parallel_threshold: usize) -> Self {
        Self {
            matrix: None,
            parallel_threshold,
        }
    }

    /// Share the index's matrix; nothing is copied
    pub fn build(&mut self, embeddings: Arc<Array2<f32>>) {
        tracing::debug!(
            "Exact backend attached to {} x {} matrix",
            embeddings.nrows(),
            embeddings.ncols()
        );
        self.matrix = Some(embeddings);
    }

    /// Similarity of the query against every stored row
    ///
    /// Rows are scored independently by the same routine in both branches,
    /// so the scores do not depend on the thread count.
    pub fn score_all(&self, query: &[f32]) -> Result<Vec<f32>> {
        let matrix = self.matrix.as_ref().ok_or(SearchError::NotBuilt)?;
        if query.len() != matrix.ncols() {
            return Err(SearchError::ShapeMismatch(format!(
                "query has dimension {}, index has {}",
                query.len(),
                matrix.ncols()
            )));
        }

        let query = ArrayView1::from(query);
        let scores: Vec<f32> = if matrix.nrows() >= self.parallel_threshold {
            matrix
                .axis_iter(Axis(0))
                .into_par_iter()
                .map(|row| row.dot(&query))
                .collect()
        } else {
            matrix
                .axis_iter(Axis(0))
                .map(|row| row.dot(&query))
                .collect()
        };
        Ok(scores)
    }

    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Neighbor>> {
        let scores = self.score_all(query)?;
        Ok(select_top_k(scores, top_k))
    }

    pub fn len(&self) -> usize {
        self.matrix.as_ref().map_or(0, |m| m.nrows())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.matrix.as_ref().map_or(0, |m| m.ncols())
    }

    pub fn clear(&mut self) {
        self.matrix = None;
    }
}
