//! Evaluation metrics: Precision@K, Recall@K, and reciprocal rank.

use std::collections::HashSet;

/// Precision at K: proportion of the top-K retrieved ids that are relevant.
/// If k is 0, returns 0.0.
pub fn precision_at_k(retrieved: &[String], relevant: &[String], k: usize) -> f32 {
    if k == 0 {
        return 0.0;
    }
    let relevant: HashSet<&str> = relevant.iter().map(String::as_str).collect();
    let top_k = retrieved.iter().take(k);
    let relevant_count = top_k.filter(|id| relevant.contains(id.as_str())).count();
    relevant_count as f32 / k as f32
}

/// Recall at K: proportion of all relevant ids that appear in the top-K.
/// If there are no relevant ids (denominator 0), returns 0.0.
pub fn recall_at_k(retrieved: &[String], relevant: &[String], k: usize) -> f32 {
    if relevant.is_empty() {
        return 0.0;
    }
    let relevant_set: HashSet<&str> = relevant.iter().map(String::as_str).collect();
    let retrieved_relevant = retrieved
        .iter()
        .take(k)
        .filter(|id| relevant_set.contains(id.as_str()))
        .count();
    retrieved_relevant as f32 / relevant.len() as f32
}

/// Reciprocal rank of the first relevant result: `1 / rank` (1-based), or
/// 0.0 when no retrieved id is relevant. Averaging this over a query set
/// gives MRR.
pub fn reciprocal_rank(retrieved: &[String], relevant: &[String]) -> f32 {
    let relevant: HashSet<&str> = relevant.iter().map(String::as_str).collect();
    for (rank0, id) in retrieved.iter().enumerate() {
        if relevant.contains(id.as_str()) {
            return 1.0 / (rank0 + 1) as f32;
        }
    }
    0.0
}
