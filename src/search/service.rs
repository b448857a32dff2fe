//! Search orchestration: cache lookup, retrieval, enrichment, filtering.

use crate::cache::QueryCache;
use crate::embeddings::Embedder;
use crate::error::{OpsearchError, Result};
use crate::index::{Bm25Index, DenseIndex, SharedIndex};
use crate::models::{
    RetrievalMode, SearchFilters, SearchRequest, SearchResponse, SearchResult, SourceType,
};
use crate::search::hybrid::{FusedResult, RrfFuser};
use crate::search::snippet::build_snippet;
use crate::store::MetadataStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Maximum accepted query length in characters.
const MAX_QUERY_CHARS: usize = 500;

/// Orchestration parameters, taken from [`crate::config::SearchConfig`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub default_top_k: usize,
    pub max_top_k: usize,
    /// Candidates requested from each retriever before fusion
    pub fetch_k: usize,
    pub rrf_k: f32,
    pub bm25_weight: f32,
    pub vector_weight: f32,
}

impl From<&crate::config::SearchConfig> for SearchOptions {
    fn from(config: &crate::config::SearchConfig) -> Self {
        Self {
            default_top_k: config.default_top_k,
            max_top_k: config.max_top_k,
            fetch_k: config.fetch_k,
            rrf_k: config.rrf_k,
            bm25_weight: config.bm25_weight,
            vector_weight: config.vector_weight,
        }
    }
}

/// High-level search service.
///
/// Owns the retrieval hot path: cache lookup, parallel BM25/dense legs,
/// RRF fusion, metadata enrichment, snippet building and post-retrieval
/// filtering. All dependencies are injected by the application root; there
/// is no module-level state.
pub struct SearchService {
    bm25: Arc<SharedIndex<Bm25Index>>,
    dense: Arc<SharedIndex<DenseIndex>>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn MetadataStore>,
    cache: Arc<QueryCache>,
    fuser: RrfFuser,
    options: SearchOptions,
}

impl SearchService {
    pub fn new(
        bm25: Arc<SharedIndex<Bm25Index>>,
        dense: Arc<SharedIndex<DenseIndex>>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn MetadataStore>,
        cache: Arc<QueryCache>,
        options: SearchOptions,
    ) -> Self {
        let fuser = RrfFuser::new(options.rrf_k, options.bm25_weight, options.vector_weight);
        Self {
            bm25,
            dense,
            embedder,
            store,
            cache,
            fuser,
            options,
        }
    }

    /// Perform a search with caching, degradation and enrichment.
    ///
    /// Within a request the result order is a pure function of index
    /// contents, query text and tuning parameters. A dense-side failure in
    /// hybrid mode degrades the request to BM25-only; a BM25-side failure,
    /// or a dense failure in vector-only mode, fails the request.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let start = Instant::now();

        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(OpsearchError::InvalidInput("query must not be empty".into()));
        }
        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(OpsearchError::InvalidInput(format!(
                "query exceeds {} characters",
                MAX_QUERY_CHARS
            )));
        }
        let top_k = match request.top_k {
            Some(0) => {
                return Err(OpsearchError::InvalidInput("top_k must be at least 1".into()))
            }
            Some(k) => k.min(self.options.max_top_k),
            None => self.options.default_top_k,
        };

        // Cache lookup. Mode is reported as hybrid on hits (best effort;
        // the original mode is not stored alongside the entry).
        if let Some(cached) = self.cache.get(&query, &request.filters, top_k) {
            log::debug!("Search cache hit for query: {}", query);
            return Ok(SearchResponse {
                query,
                total_results: cached.len(),
                results: cached,
                latency_ms: elapsed_ms(start),
                retrieval_mode: RetrievalMode::Hybrid,
                cache_hit: true,
            });
        }

        let (fused, mode) = self.retrieve(&query).await?;

        let enriched = self.enrich(fused, &query).await?;
        let mut filtered = apply_filters(enriched, &request.filters);
        filtered.truncate(top_k);

        self.cache.set(&query, filtered.clone(), &request.filters, top_k);

        let latency_ms = elapsed_ms(start);
        log::debug!(
            "Search complete: query={:?} mode={} results={} latency={:.1}ms",
            query,
            mode,
            filtered.len(),
            latency_ms
        );

        Ok(SearchResponse {
            query,
            total_results: filtered.len(),
            results: filtered,
            latency_ms,
            retrieval_mode: mode,
            cache_hit: false,
        })
    }

    /// Run the retrieval legs according to readiness, with per-request
    /// degradation on dense failure.
    async fn retrieve(&self, query: &str) -> Result<(Vec<FusedResult>, RetrievalMode)> {
        let fetch_k = self.options.fetch_k;

        match (self.bm25.get(), self.dense.get()) {
            (Some(bm25), Some(dense)) => {
                // Both legs in parallel: BM25 runs to completion on the
                // worker, the dense leg suspends on the embedding call.
                let (bm25_results, dense_results) = tokio::join!(
                    async { bm25.search(query, fetch_k) },
                    dense.search(self.embedder.as_ref(), query, fetch_k),
                );

                match dense_results {
                    Ok(vector_results) => Ok((
                        self.fuser.fuse(bm25_results, vector_results, fetch_k),
                        RetrievalMode::Hybrid,
                    )),
                    Err(e) => {
                        log::warn!(
                            "Dense search failed for query {:?}, degrading to BM25-only: {}",
                            query,
                            e
                        );
                        Ok((
                            self.fuser.bm25_only(bm25_results, fetch_k),
                            RetrievalMode::Bm25Only,
                        ))
                    }
                }
            }
            (Some(bm25), None) => Ok((
                self.fuser.bm25_only(bm25.search(query, fetch_k), fetch_k),
                RetrievalMode::Bm25Only,
            )),
            (None, Some(dense)) => {
                // Vector-only cannot degrade; failure surfaces to the caller.
                let results = dense
                    .search(self.embedder.as_ref(), query, fetch_k)
                    .await?;
                Ok((
                    self.fuser.vector_only(results, fetch_k),
                    RetrievalMode::VectorOnly,
                ))
            }
            (None, None) => {
                log::warn!("No index loaded; returning empty results");
                Ok((Vec::new(), RetrievalMode::Hybrid))
            }
        }
    }

    /// Enrich fused candidates with chunk/document metadata and snippets.
    ///
    /// Chunks are fetched in one batch; candidates whose chunk or document
    /// has disappeared (race with ingest deletion) are dropped silently.
    async fn enrich(&self, fused: Vec<FusedResult>, query: &str) -> Result<Vec<SearchResult>> {
        if fused.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_ids: Vec<String> = fused.iter().map(|r| r.chunk_id.clone()).collect();
        let chunks = self.store.get_chunks_by_ids(&chunk_ids).await?;
        let chunk_map: HashMap<String, crate::store::ChunkRecord> =
            chunks.into_iter().map(|c| (c.id.clone(), c)).collect();

        // One lookup per distinct document
        let mut doc_map: HashMap<String, crate::store::DocumentRecord> = HashMap::new();
        for chunk in chunk_map.values() {
            if !doc_map.contains_key(&chunk.document_id) {
                if let Some(doc) = self.store.get_document(&chunk.document_id).await? {
                    doc_map.insert(doc.id.clone(), doc);
                }
            }
        }

        let mut enriched = Vec::with_capacity(fused.len());
        for result in fused {
            let Some(chunk) = chunk_map.get(&result.chunk_id) else {
                continue;
            };
            let Some(doc) = doc_map.get(&chunk.document_id) else {
                continue;
            };

            let (project, source_type) = classify_source(&doc.source_id);

            enriched.push(SearchResult {
                chunk_id: result.chunk_id,
                document_id: doc.id.clone(),
                title: doc.title.clone(),
                url: doc.url.clone(),
                source_type,
                project,
                updated_at: doc.updated_at,
                snippet: build_snippet(&chunk.content, query),
                scores: result.scores,
            });
        }

        Ok(enriched)
    }

    /// Cache statistics passthrough for status reporting.
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Derive `(project, source_type)` from a document's source id.
///
/// Source ids take the form `<project>-<kind>`, e.g. `etcd-docs` or
/// `prometheus-issues`.
fn classify_source(source_id: &str) -> (String, SourceType) {
    let project = source_id
        .split('-')
        .next()
        .filter(|p| !p.is_empty())
        .unwrap_or("unknown")
        .to_string();
    let source_type = if source_id.contains("issues") {
        SourceType::Issues
    } else {
        SourceType::Docs
    };
    (project, source_type)
}

/// Apply post-retrieval filters, preserving relative order.
fn apply_filters(results: Vec<SearchResult>, filters: &SearchFilters) -> Vec<SearchResult> {
    let mut filtered = results;

    if let Some(source_types) = &filters.source_types {
        filtered.retain(|r| source_types.contains(&r.source_type));
    }

    if let Some(projects) = &filters.projects {
        filtered.retain(|r| projects.contains(&r.project));
    }

    filtered
}
