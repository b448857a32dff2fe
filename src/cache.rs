//! TTL-bounded LRU cache for enriched search results.
//!
//! Keyed by `(normalized query, canonical filters, top_k)`. Entries past
//! their TTL are treated as absent and removed lazily on access; there is no
//! background sweeper. The lock guards pointer manipulation only, never I/O.

use crate::models::{SearchFilters, SearchResult};
use lru::LruCache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A cached result list with bookkeeping metadata.
struct CacheEntry {
    results: Vec<SearchResult>,
    created_at: Instant,
    hits: u64,
}

struct CacheInner {
    entries: LruCache<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Thread-safe TTL + LRU query cache.
pub struct QueryCache {
    inner: Mutex<CacheInner>,
    max_size: usize,
    ttl: Duration,
}

impl QueryCache {
    /// Create a cache holding at most `max_size` entries, each valid for
    /// `ttl_seconds` after insertion.
    pub fn new(max_size: usize, ttl_seconds: u64) -> Self {
        let cap = NonZeroUsize::new(max_size.max(1)).expect("Cache capacity must be at least 1");
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(cap),
                hits: 0,
                misses: 0,
            }),
            max_size: max_size.max(1),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    /// Generate the cache key: first 32 hex chars of SHA-256 over the
    /// canonical JSON of the normalized query, sorted filters and top_k.
    ///
    /// 128 bits of digest; collisions are treated as probabilistically
    /// impossible at target scales. Shorter prefixes must not be used.
    fn make_key(query: &str, filters: &SearchFilters, top_k: usize) -> String {
        #[derive(Serialize)]
        struct KeyData<'a> {
            query: String,
            filters: CanonicalFilters<'a>,
            top_k: usize,
        }

        #[derive(Serialize)]
        struct CanonicalFilters<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            source_types: Option<Vec<String>>,
            #[serde(skip_serializing_if = "Option::is_none")]
            projects: Option<Vec<&'a str>>,
            #[serde(skip_serializing_if = "Option::is_none")]
            tags: Option<Vec<&'a str>>,
        }

        fn sorted<'a>(values: &'a Option<Vec<String>>) -> Option<Vec<&'a str>> {
            values.as_ref().map(|v| {
                let mut sorted: Vec<&str> = v.iter().map(String::as_str).collect();
                sorted.sort_unstable();
                sorted
            })
        }

        let source_types = filters.source_types.as_ref().map(|v| {
            let mut sorted: Vec<String> = v.iter().map(|s| s.to_string()).collect();
            sorted.sort_unstable();
            sorted
        });

        let key_data = KeyData {
            query: query.trim().to_lowercase(),
            filters: CanonicalFilters {
                source_types,
                projects: sorted(&filters.projects),
                tags: sorted(&filters.tags),
            },
            top_k,
        };

        // serde_json object keys serialize in struct field order, which is
        // fixed here, so the serialization is canonical.
        let key_json = serde_json::to_string(&key_data).expect("key data serializes");
        let digest = Sha256::digest(key_json.as_bytes());
        format!("{:x}", digest)[..32].to_string()
    }

    /// Get cached results, or `None` on miss or TTL expiry.
    ///
    /// A hit moves the entry to most-recently-used; an expired entry is
    /// removed and counted as a miss.
    pub fn get(
        &self,
        query: &str,
        filters: &SearchFilters,
        top_k: usize,
    ) -> Option<Vec<SearchResult>> {
        let key = Self::make_key(query, filters, top_k);
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;

        // LruCache::get_mut promotes to MRU as a side effect
        let expired = match inner.entries.get_mut(&key) {
            Some(entry) if entry.created_at.elapsed() <= self.ttl => {
                entry.hits += 1;
                inner.hits += 1;
                return Some(entry.results.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.entries.pop(&key);
        }
        inner.misses += 1;
        None
    }

    /// Cache results for a query. The list is stored by value, so later
    /// mutation by the caller cannot poison the cache.
    pub fn set(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        filters: &SearchFilters,
        top_k: usize,
    ) {
        let key = Self::make_key(query, filters, top_k);
        let entry = CacheEntry {
            results,
            created_at: Instant::now(),
            hits: 0,
        };
        // LruCache::put evicts the least-recently-used entry at capacity
        self.inner.lock().unwrap().entries.put(key, entry);
    }

    /// Clear all cached entries (e.g. after an index swap).
    pub fn invalidate(&self) {
        self.inner.lock().unwrap().entries.clear();
    }

    /// Current number of cached entries.
    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Hit rate over all lookups so far (0.0 when none).
    pub fn hit_rate(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        let total = inner.hits + inner.misses;
        if total > 0 {
            inner.hits as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        let total = inner.hits + inner.misses;
        CacheStats {
            size: inner.entries.len(),
            max_size: self.max_size,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if total > 0 {
                inner.hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}
