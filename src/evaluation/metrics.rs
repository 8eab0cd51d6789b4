//! Ranked-retrieval metrics with binary relevance
//!
//! - Recall@K: share of the relevant documents found in the top K
//! - nDCG@K: DCG of the ranking divided by the DCG of an ideal ranking
//!
//! Both are 0.0 when the relevance set is empty.

use std::collections::HashSet;

/// Compute Recall@K
///
/// Recall@K = |set(ranked[..K]) ∩ relevant| / |relevant|
pub fn recall_at_k(ranked: &[String], relevant: &HashSet<String>, k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }

    let top_k: HashSet<&String> = ranked.iter().take(k).collect();
    let found = top_k.iter().filter(|doc| relevant.contains(**doc)).count();

    found as f64 / relevant.len() as f64
}

/// Compute DCG@K
///
/// DCG@K = Σ rel(i) / log2(i + 1) over the first min(K, len) ranks
pub fn dcg_at_k(ranked: &[String], relevant: &HashSet<String>, k: usize) -> f64 {
    ranked
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, doc)| relevant.contains(*doc))
        .map(|(i, _)| 1.0 / (i as f64 + 2.0).log2())
        .sum()
}

/// Compute Ideal DCG@K for `num_relevant` relevant documents
pub fn idcg_at_k(num_relevant: usize, k: usize) -> f64 {
    (0..num_relevant.min(k))
        .map(|i| 1.0 / (i as f64 + 2.0).log2())
        .sum()
}

/// Compute nDCG@K
///
/// NDCG@K = DCG@K / IDCG@K, or 0.0 when IDCG@K is 0
pub fn ndcg_at_k(ranked: &[String], relevant: &HashSet<String>, k: usize) -> f64 {
    let idcg = idcg_at_k(relevant.len(), k);
    if idcg == 0.0 {
        return 0.0;
    }
    dcg_at_k(ranked, relevant, k) / idcg
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_recall_at_k() {
        let ranked = ids(&["d1", "d2", "d3", "d4", "d5"]);
        let relevant = set(&["d2", "d5", "d9"]);

        assert!((recall_at_k(&ranked, &relevant, 1) - 0.0).abs() < 1e-9);
        assert!((recall_at_k(&ranked, &relevant, 2) - 1.0 / 3.0).abs() < 1e-9);
        assert!((recall_at_k(&ranked, &relevant, 100) - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_recall_edge_cases() {
        assert_eq!(recall_at_k(&[], &set(&["d1"]), 10), 0.0);
        assert_eq!(recall_at_k(&ids(&["d1"]), &HashSet::new(), 10), 0.0);

        let ranked = ids(&["a", "b", "c", "d", "e", "f"]);
        let relevant: HashSet<String> = ranked[..5].iter().cloned().collect();
        assert_eq!(recall_at_k(&ranked, &relevant, 5), 1.0);

        // duplicates in the ranking are counted once
        assert_eq!(recall_at_k(&ids(&["a", "a"]), &set(&["a", "b"]), 2), 0.5);
    }

    #[test]
    fn test_ndcg_at_k() {
        let relevant = set(&["d1", "d2"]);

        assert!((ndcg_at_k(&ids(&["d1", "d2", "d3"]), &relevant, 10) - 1.0).abs() < 1e-9);

        // relevant at ranks 2 and 3: (1/log2(3) + 1/log2(4)) / (1 + 1/log2(3))
        let expected = (1.0 / 3f64.log2() + 0.5) / (1.0 + 1.0 / 3f64.log2());
        let ndcg = ndcg_at_k(&ids(&["d3", "d1", "d2"]), &relevant, 10);
        assert!((ndcg - expected).abs() < 1e-9);

        assert_eq!(ndcg_at_k(&ids(&["d3", "d4"]), &relevant, 10), 0.0);
        assert_eq!(ndcg_at_k(&ids(&["d1"]), &HashSet::new(), 10), 0.0);
    }

    #[test]
    fn test_ndcg_cutoff() {
        let relevant = set(&["d3"]);
        let ranked = ids(&["d1", "d2", "d3"]);
        assert_eq!(ndcg_at_k(&ranked, &relevant, 2), 0.0);
        assert!((ndcg_at_k(&ranked, &relevant, 3) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_idcg_caps_at_k() {
        assert_eq!(idcg_at_k(0, 10), 0.0);
        assert!((idcg_at_k(1, 10) - 1.0).abs() < 1e-9);
        assert_eq!(idcg_at_k(50, 3), idcg_at_k(3, 3));
    }

    proptest! {
        #[test]
        fn prop_metrics_are_bounded(
            ranked in prop::collection::hash_set("[a-h]", 0..8),
            relevant in prop::collection::hash_set("[a-h]", 0..8),
            k in 0usize..12,
        ) {
            let ranked: Vec<String> = ranked.into_iter().collect();
            let recall = recall_at_k(&ranked, &relevant, k);
            let ndcg = ndcg_at_k(&ranked, &relevant, k);
            prop_assert!((0.0..=1.0).contains(&recall));
            prop_assert!((0.0..=1.0 + 1e-12).contains(&ndcg));
        }

        #[test]
        fn prop_relevant_first_is_perfect(
            relevant in prop::collection::hash_set("[a-z]{3}", 1..10),
            k in 1usize..12,
        ) {
            let mut ranked: Vec<String> = relevant.iter().cloned().collect();
            ranked.push("not-relevant".to_string());
            prop_assert!((ndcg_at_k(&ranked, &relevant, k) - 1.0).abs() < 1e-9);
            if k >= relevant.len() {
                prop_assert_eq!(recall_at_k(&ranked, &relevant, k), 1.0);
            }
        }
    }
}
