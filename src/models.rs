//! Search request/response types with per-retriever score breakdowns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Origin of an indexed document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Docs,
    Issues,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Docs => write!(f, "docs"),
            SourceType::Issues => write!(f, "issues"),
        }
    }
}

/// Which retrievers produced a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    Hybrid,
    Bm25Only,
    VectorOnly,
}

impl std::fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrievalMode::Hybrid => write!(f, "hybrid"),
            RetrievalMode::Bm25Only => write!(f, "bm25_only"),
            RetrievalMode::VectorOnly => write!(f, "vector_only"),
        }
    }
}

/// Score breakdown for a search result.
///
/// A missing side means the chunk was not returned by that retriever (or the
/// retriever was not available for the request). Ranks are 1-based.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub bm25_score: Option<f32>,
    pub bm25_rank: Option<usize>,
    pub vector_score: Option<f32>,
    pub vector_rank: Option<usize>,
    pub final_score: f32,
}

/// A single enriched search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub document_id: String,
    pub title: String,
    pub url: String,
    pub source_type: SourceType,
    pub project: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Snippet with query terms wrapped in `<mark>` tags
    pub snippet: String,
    pub scores: ScoreBreakdown,
}

/// Post-retrieval filters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_types: Option<Vec<SourceType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.source_types.is_none() && self.projects.is_none() && self.tags.is_none()
    }
}

/// Search request
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    /// Defaults to the configured `default_top_k` when absent
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default = "default_include_scores")]
    pub include_scores: bool,
}

fn default_include_scores() -> bool {
    true
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            filters: SearchFilters::default(),
            top_k: None,
            include_scores: true,
        }
    }
}

/// Search response
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub total_results: usize,
    pub latency_ms: f64,
    pub retrieval_mode: RetrievalMode,
    pub cache_hit: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_mode_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RetrievalMode::Bm25Only).unwrap(),
            "\"bm25_only\""
        );
        assert_eq!(
            serde_json::to_string(&RetrievalMode::Hybrid).unwrap(),
            "\"hybrid\""
        );
    }

    #[test]
    fn test_source_type_round_trip() {
        let json = serde_json::to_string(&SourceType::Issues).unwrap();
        assert_eq!(json, "\"issues\"");
        let back: SourceType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SourceType::Issues);
    }

    #[test]
    fn test_request_defaults() {
        let request: SearchRequest = serde_json::from_str(r#"{"query": "oom"}"#).unwrap();
        assert_eq!(request.query, "oom");
        assert!(request.filters.is_empty());
        assert!(request.top_k.is_none());
        assert!(request.include_scores);
    }

    #[test]
    fn test_request_with_filters() {
        let request: SearchRequest = serde_json::from_str(
            r#"{"query": "oom", "filters": {"source_types": ["docs"]}, "top_k": 3}"#,
        )
        .unwrap();
        assert_eq!(request.top_k, Some(3));
        assert_eq!(
            request.filters.source_types,
            Some(vec![SourceType::Docs])
        );
    }
}
