//! Reciprocal Rank Fusion of BM25 and dense candidate lists.
//!
//! RRF is rank-based, so it needs no score normalization and is robust to
//! the very different score distributions of the two retrievers.

use crate::models::ScoreBreakdown;
use std::collections::HashMap;

/// A fused candidate: chunk id plus the per-retriever score breakdown.
#[derive(Debug, Clone)]
pub struct FusedResult {
    pub chunk_id: String,
    pub scores: ScoreBreakdown,
}

/// Rank-based merger of the two retriever outputs.
///
/// For a chunk at 1-based rank `r` in a list with weight `w`, the list
/// contributes `w / (rrf_k + r)`; contributions accumulate across lists.
#[derive(Debug, Clone)]
pub struct RrfFuser {
    rrf_k: f32,
    bm25_weight: f32,
    vector_weight: f32,
}

impl RrfFuser {
    pub fn new(rrf_k: f32, bm25_weight: f32, vector_weight: f32) -> Self {
        Self {
            rrf_k,
            bm25_weight,
            vector_weight,
        }
    }

    /// Fuse both candidate lists, returning at most `top_k` results ordered
    /// by descending RRF score.
    ///
    /// Equal RRF scores resolve by: presence in both lists first, then
    /// smaller best rank, then ascending chunk id.
    pub fn fuse(
        &self,
        bm25_results: Vec<(String, f32)>,
        vector_results: Vec<(String, f32)>,
        top_k: usize,
    ) -> Vec<FusedResult> {
        let mut merged: HashMap<String, ScoreBreakdown> = HashMap::new();

        for (rank0, (chunk_id, score)) in bm25_results.into_iter().enumerate() {
            let rank = rank0 + 1;
            let entry = merged.entry(chunk_id).or_default();
            entry.bm25_score = Some(score);
            entry.bm25_rank = Some(rank);
            entry.final_score += self.bm25_weight / (self.rrf_k + rank as f32);
        }

        for (rank0, (chunk_id, score)) in vector_results.into_iter().enumerate() {
            let rank = rank0 + 1;
            let entry = merged.entry(chunk_id).or_default();
            entry.vector_score = Some(score);
            entry.vector_rank = Some(rank);
            entry.final_score += self.vector_weight / (self.rrf_k + rank as f32);
        }

        let mut fused: Vec<FusedResult> = merged
            .into_iter()
            .map(|(chunk_id, scores)| FusedResult { chunk_id, scores })
            .collect();

        fused.sort_by(|a, b| {
            b.scores
                .final_score
                .partial_cmp(&a.scores.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| in_both(b).cmp(&in_both(a)))
                .then_with(|| best_rank(a).cmp(&best_rank(b)))
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });

        fused.truncate(top_k);
        fused
    }

    /// Degraded contract: only the BM25 side is available. The final score
    /// is the raw BM25 score, not an RRF score.
    pub fn bm25_only(&self, bm25_results: Vec<(String, f32)>, top_k: usize) -> Vec<FusedResult> {
        bm25_results
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(rank0, (chunk_id, score))| FusedResult {
                chunk_id,
                scores: ScoreBreakdown {
                    bm25_score: Some(score),
                    bm25_rank: Some(rank0 + 1),
                    final_score: score,
                    ..Default::default()
                },
            })
            .collect()
    }

    /// Degraded contract: only the dense side is available.
    pub fn vector_only(&self, vector_results: Vec<(String, f32)>, top_k: usize) -> Vec<FusedResult> {
        vector_results
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(rank0, (chunk_id, score))| FusedResult {
                chunk_id,
                scores: ScoreBreakdown {
                    vector_score: Some(score),
                    vector_rank: Some(rank0 + 1),
                    final_score: score,
                    ..Default::default()
                },
            })
            .collect()
    }
}

fn in_both(result: &FusedResult) -> bool {
    result.scores.bm25_rank.is_some() && result.scores.vector_rank.is_some()
}

fn best_rank(result: &FusedResult) -> usize {
    let bm25 = result.scores.bm25_rank.unwrap_or(usize::MAX);
    let vector = result.scores.vector_rank.unwrap_or(usize::MAX);
    bm25.min(vector)
}
