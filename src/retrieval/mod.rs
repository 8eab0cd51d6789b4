//! Retrieval engines
//!
//! A [`Retriever`] turns a query string into a ranked list of
//! [`SearchResult`]s. The dense retriever embeds the query and searches the
//! [`VectorIndex`](crate::index::VectorIndex).

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod dense;

// Re-exports
pub use dense::*;

/// Default number of characters shown from a document in listings
pub const DEFAULT_EXCERPT_CHARS: usize = 200;

/// Search result with document metadata and relevance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Rank in the result list (1-indexed)
    pub rank: usize,
    /// Document ID
    pub doc_id: String,
    /// Display name of the document's language
    pub language: String,
    /// Cosine similarity (higher is better)
    pub score: f32,
    /// Full document text, when requested and available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl SearchResult {
    /// Render the result as a listing entry, truncating the text to
    /// `max_chars` characters
    pub fn format_with_excerpt(&self, max_chars: usize) -> String {
        let mut out = format!(
            "{}. [{}] {} (score: {:.4})",
            self.rank, self.language, self.doc_id, self.score
        );
        if let Some(text) = &self.text {
            let excerpt: String = text.chars().take(max_chars).collect();
            let ellipsis = if text.chars().count() > max_chars { "..." } else { "" };
            out.push_str(&format!("\n   {}{}", excerpt.replace('\n', " "), ellipsis));
        }
        out
    }
}

impl fmt::Display for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_with_excerpt(DEFAULT_EXCERPT_CHARS))
    }
}

/// Trait for retrieval engines
pub trait Retriever: Send + Sync {
    /// Retrieve the top-k most similar documents for a query
    fn retrieve(&self, query: &str, top_k: usize, include_text: bool) -> Result<Vec<SearchResult>>;

    /// Retrieve for several queries in order
    ///
    /// The first failing query fails the whole batch.
    fn batch_retrieve(&self, queries: &[&str], top_k: usize) -> Result<Vec<Vec<SearchResult>>> {
        queries
            .iter()
            .map(|query| self.retrieve(query, top_k, false))
            .collect()
    }

    /// Get the name of this retriever
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(text: Option<&str>) -> SearchResult {
        SearchResult {
            rank: 2,
            doc_id: "hi#7".to_string(),
            language: "Hindi".to_string(),
            score: 0.81234,
            text: text.map(String::from),
        }
    }

    #[test]
    fn test_format_without_text() {
        assert_eq!(result(None).to_string(), "2. [Hindi] hi#7 (score: 0.8123)");
    }

    #[test]
    fn test_format_truncates_by_characters() {
        let formatted = result(Some("नमस्ते दुनिया\nदूसरी पंक्ति")).format_with_excerpt(4);
        let excerpt = formatted.lines().nth(1).unwrap();
        assert_eq!(excerpt.trim(), "नमस्...");
    }

    #[test]
    fn test_text_omitted_from_json_when_absent() {
        let json = serde_json::to_value(result(None)).unwrap();
        assert!(json.get("text").is_none());
        assert_eq!(json["doc_id"], "hi#7");
    }
}
