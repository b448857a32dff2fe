//! BM25 inverted index over tokenized chunks.
//!
//! The on-disk form is the canonical `{k1, b, chunk_ids, corpus}` JSON;
//! postings are materialized from the tokenized corpus on build and on load
//! through the same code path, so a loaded index ranks identically to a
//! freshly built one.

use crate::error::{OpsearchError, Result};
use crate::tokenize::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// On-disk form of a BM25 index.
#[derive(Serialize, Deserialize)]
struct Bm25File {
    k1: f32,
    b: f32,
    chunk_ids: Vec<String>,
    corpus: Vec<Vec<String>>,
}

/// Frozen BM25 index.
///
/// Built whole via [`Bm25Index::build`] or [`Bm25Index::load`]; never mutated
/// afterwards, so concurrent readers need no locking.
pub struct Bm25Index {
    k1: f32,
    b: f32,
    avgdl: f32,
    /// Ordinal -> chunk_id, in build input order
    chunk_ids: Vec<String>,
    /// Ordinal -> token count
    doc_lengths: Vec<u32>,
    /// Tokenized documents, retained for canonical serialization
    corpus: Vec<Vec<String>>,
    /// term -> term_id (dense, zero-based, frozen after build)
    vocab: HashMap<String, usize>,
    /// term_id -> postings list, sorted by doc ordinal
    postings: Vec<Vec<(u32, u32)>>,
    /// term_id -> document frequency
    df: Vec<u32>,
}

impl Bm25Index {
    /// Build an index from `(chunk_id, content)` pairs.
    ///
    /// Ordinals are assigned in input order. Building from an empty slice
    /// yields a ready-but-empty index whose searches return no results.
    ///
    /// Runs in `O(total_tokens)` time and space.
    pub fn build(chunks: &[(String, String)], k1: f32, b: f32) -> Self {
        let chunk_ids: Vec<String> = chunks.iter().map(|(id, _)| id.clone()).collect();
        let corpus: Vec<Vec<String>> = chunks
            .iter()
            .map(|(_, content)| tokenize(content))
            .collect();
        Self::from_corpus(k1, b, chunk_ids, corpus)
    }

    /// Construct the frozen structure from an already-tokenized corpus.
    ///
    /// Shared by `build` and `load` so the two paths cannot diverge.
    fn from_corpus(k1: f32, b: f32, chunk_ids: Vec<String>, corpus: Vec<Vec<String>>) -> Self {
        let mut doc_lengths = Vec::with_capacity(corpus.len());
        let mut vocab: HashMap<String, usize> = HashMap::new();
        let mut postings: Vec<Vec<(u32, u32)>> = Vec::new();

        for (ordinal, tokens) in corpus.iter().enumerate() {
            doc_lengths.push(tokens.len() as u32);

            let mut tf: HashMap<&str, u32> = HashMap::new();
            for token in tokens {
                *tf.entry(token.as_str()).or_insert(0) += 1;
            }

            // Documents are processed in ordinal order, so each postings
            // list stays sorted by doc ordinal without an explicit sort.
            for (term, count) in tf {
                let term_id = match vocab.get(term) {
                    Some(&id) => id,
                    None => {
                        let id = postings.len();
                        vocab.insert(term.to_string(), id);
                        postings.push(Vec::new());
                        id
                    }
                };
                postings[term_id].push((ordinal as u32, count));
            }
        }

        // Per-document term maps iterate in arbitrary order, but each doc
        // contributes at most one entry per term, so only within-list order
        // across documents matters; restore it here.
        for list in &mut postings {
            list.sort_by_key(|&(ordinal, _)| ordinal);
        }

        let df: Vec<u32> = postings.iter().map(|list| list.len() as u32).collect();

        let total_len: u64 = doc_lengths.iter().map(|&l| l as u64).sum();
        let avgdl = if doc_lengths.is_empty() {
            0.0
        } else {
            total_len as f32 / doc_lengths.len() as f32
        };

        Self {
            k1,
            b,
            avgdl,
            chunk_ids,
            doc_lengths,
            corpus,
            vocab,
            postings,
            df,
        }
    }

    /// Inverse document frequency for a term with document frequency `df`.
    ///
    /// `ln((N - df + 0.5) / (df + 0.5) + 1)`. Always positive, unlike the
    /// classic formulation which can go negative for very common terms.
    fn idf(&self, df: u32) -> f32 {
        let n = self.chunk_ids.len() as f32;
        let df = df as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Search the index, returning at most `top_k` `(chunk_id, score)` pairs.
    ///
    /// Query tokens are a multiset: a term appearing twice in the query
    /// contributes its term score twice. Out-of-vocabulary tokens contribute
    /// nothing; documents scoring <= 0 are discarded. Equal scores resolve
    /// by ascending ordinal (build insertion order).
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(String, f32)> {
        if top_k == 0 || self.chunk_ids.is_empty() {
            return Vec::new();
        }

        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let mut scores = vec![0.0f32; self.chunk_ids.len()];
        let mut touched = false;

        for token in &query_tokens {
            let Some(&term_id) = self.vocab.get(token.as_str()) else {
                continue;
            };
            touched = true;
            let idf = self.idf(self.df[term_id]);
            for &(ordinal, tf) in &self.postings[term_id] {
                let tf = tf as f32;
                let doc_len = self.doc_lengths[ordinal as usize] as f32;
                let norm = self.k1 * (1.0 - self.b + self.b * doc_len / self.avgdl);
                scores[ordinal as usize] += idf * (tf * (self.k1 + 1.0)) / (tf + norm);
            }
        }

        if !touched {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = scores
            .into_iter()
            .enumerate()
            .filter(|&(_, score)| score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        scored
            .into_iter()
            .take(top_k)
            .map(|(ordinal, score)| (self.chunk_ids[ordinal].clone(), score))
            .collect()
    }

    /// Serialize the canonical `{k1, b, chunk_ids, corpus}` form.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = Bm25File {
            k1: self.k1,
            b: self.b,
            chunk_ids: self.chunk_ids.clone(),
            corpus: self.corpus.clone(),
        };
        let json = serde_json::to_string(&file)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load the canonical form and rebuild postings.
    ///
    /// Rejects files with missing parameters or a `chunk_ids`/`corpus`
    /// length disagreement as [`OpsearchError::IndexCorrupt`].
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let file: Bm25File = serde_json::from_str(&raw).map_err(|e| {
            OpsearchError::IndexCorrupt(format!("{}: {}", path.display(), e))
        })?;

        if file.chunk_ids.len() != file.corpus.len() {
            return Err(OpsearchError::IndexCorrupt(format!(
                "{}: chunk_ids ({}) and corpus ({}) lengths disagree",
                path.display(),
                file.chunk_ids.len(),
                file.corpus.len()
            )));
        }

        if !file.k1.is_finite() || !file.b.is_finite() {
            return Err(OpsearchError::IndexCorrupt(format!(
                "{}: non-finite BM25 parameters",
                path.display()
            )));
        }

        Ok(Self::from_corpus(file.k1, file.b, file.chunk_ids, file.corpus))
    }

    /// Number of indexed chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunk_ids.len()
    }

    /// Average tokenized document length (0 for an empty index).
    pub fn avgdl(&self) -> f32 {
        self.avgdl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(id: &str, content: &str) -> (String, String) {
        (id.to_string(), content.to_string())
    }

    fn sample_chunks() -> Vec<(String, String)> {
        vec![
            chunk("c1", "CrashLoopBackOff is a pod state seen after repeated restarts"),
            chunk("c2", "The scheduler assigns pods to nodes based on resource requests"),
            chunk("c3", "OOMKilled means the container exceeded its memory limit"),
            chunk("c4", "Restart policies control pod restarts after failures"),
        ]
    }

    #[test]
    fn test_build_and_search_exact_term() {
        let index = Bm25Index::build(&sample_chunks(), 1.5, 0.75);
        assert_eq!(index.chunk_count(), 4);

        let results = index.search("CrashLoopBackOff", 5);
        assert!(!results.is_empty());
        assert_eq!(results[0].0, "c1");
        assert!(results[0].1 > 0.0, "matched term must score positive");
    }

    #[test]
    fn test_search_ranks_by_relevance() {
        let index = Bm25Index::build(&sample_chunks(), 1.5, 0.75);
        let results = index.search("pod restarts", 5);

        // c4 mentions both query terms, c1 both as well; every returned
        // score must be positive and ordering non-increasing.
        assert!(results.len() >= 2);
        for window in results.windows(2) {
            assert!(window[0].1 >= window[1].1);
        }
        for (_, score) in &results {
            assert!(*score > 0.0);
        }
    }

    #[test]
    fn test_search_zero_score_documents_discarded() {
        let index = Bm25Index::build(&sample_chunks(), 1.5, 0.75);
        let results = index.search("scheduler", 10);
        assert_eq!(results.len(), 1, "only c2 contains 'scheduler'");
        assert_eq!(results[0].0, "c2");
    }

    #[test]
    fn test_search_out_of_vocabulary_returns_empty() {
        let index = Bm25Index::build(&sample_chunks(), 1.5, 0.75);
        assert!(index.search("zzzzunknownzzzz", 5).is_empty());
    }

    #[test]
    fn test_search_empty_query_returns_empty() {
        let index = Bm25Index::build(&sample_chunks(), 1.5, 0.75);
        assert!(index.search("", 5).is_empty());
        assert!(index.search("   !!!   ", 5).is_empty());
    }

    #[test]
    fn test_empty_build_is_ready_but_empty() {
        let index = Bm25Index::build(&[], 1.5, 0.75);
        assert_eq!(index.chunk_count(), 0);
        assert_eq!(index.avgdl(), 0.0);
        assert!(index.search("anything", 5).is_empty());
    }

    #[test]
    fn test_tie_break_by_ordinal() {
        // Two identical documents: identical scores, earlier ordinal first.
        let chunks = vec![
            chunk("first", "identical content here"),
            chunk("second", "identical content here"),
        ];
        let index = Bm25Index::build(&chunks, 1.5, 0.75);
        let results = index.search("identical content", 5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "first");
        assert_eq!(results[1].0, "second");
        assert!((results[0].1 - results[1].1).abs() < 1e-6);
    }

    #[test]
    fn test_repeated_query_term_scores_double() {
        let index = Bm25Index::build(&sample_chunks(), 1.5, 0.75);
        let single = index.search("scheduler", 5);
        let double = index.search("scheduler scheduler", 5);
        assert_eq!(single[0].0, double[0].0);
        assert!((double[0].1 - 2.0 * single[0].1).abs() < 1e-5);
    }

    #[test]
    fn test_top_k_limit() {
        let index = Bm25Index::build(&sample_chunks(), 1.5, 0.75);
        let results = index.search("pod restarts memory", 2);
        assert!(results.len() <= 2);
    }

    #[test]
    fn test_save_load_search_equivalence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bm25_index.json");

        let built = Bm25Index::build(&sample_chunks(), 1.5, 0.75);
        built.save(&path).unwrap();

        let loaded = Bm25Index::load(&path).unwrap();
        assert_eq!(loaded.chunk_count(), built.chunk_count());
        assert_eq!(loaded.avgdl(), built.avgdl());

        for query in ["pod restarts", "OOMKilled", "scheduler resource", "nothing here"] {
            assert_eq!(
                built.search(query, 10),
                loaded.search(query, 10),
                "loaded index must rank identically for {:?}",
                query
            );
        }
    }

    #[test]
    fn test_load_rejects_missing_parameters() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bm25_index.json");
        std::fs::write(&path, r#"{"chunk_ids": [], "corpus": []}"#).unwrap();

        let result = Bm25Index::load(&path);
        assert!(matches!(result, Err(OpsearchError::IndexCorrupt(_))));
    }

    #[test]
    fn test_load_rejects_length_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bm25_index.json");
        std::fs::write(
            &path,
            r#"{"k1": 1.5, "b": 0.75, "chunk_ids": ["c1", "c2"], "corpus": [["only"]]}"#,
        )
        .unwrap();

        let result = Bm25Index::load(&path);
        assert!(matches!(result, Err(OpsearchError::IndexCorrupt(_))));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = Bm25Index::load(&temp_dir.path().join("absent.json"));
        assert!(matches!(result, Err(OpsearchError::Io(_))));
    }
}
