//! Flat inner-product index over unit-norm embedding vectors.
//!
//! At the target corpus scale a flat scan is cache-friendly and keeps the
//! ranking contract free of ANN recall variability. Rows are little-endian
//! f32, row-major, aligned positionally with the chunk-id sidecar.

use crate::embeddings::{l2_normalize, Embedder};
use crate::error::{OpsearchError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// JSON sidecar persisted next to the vector matrix.
#[derive(Serialize, Deserialize)]
struct ChunkIdMap {
    chunk_ids: Vec<String>,
    embedding_dim: usize,
    model_name: String,
}

/// Frozen dense index.
///
/// Built whole via [`DenseIndex::build`] or [`DenseIndex::load`]; never
/// mutated afterwards, so concurrent readers need no locking.
pub struct DenseIndex {
    dimension: usize,
    model_name: String,
    /// Ordinal -> chunk_id, parallel to matrix rows
    chunk_ids: Vec<String>,
    /// Row-major `N x dimension` matrix
    vectors: Vec<f32>,
}

impl DenseIndex {
    /// Build an index by embedding `(chunk_id, content)` pairs.
    ///
    /// Embedding happens in batches (the embedder's configured batch size);
    /// every row is L2-normalized before insertion so inner product equals
    /// cosine similarity.
    pub async fn build(chunks: &[(String, String)], embedder: &dyn Embedder) -> Result<Self> {
        let dimension = embedder.dimension();
        let chunk_ids: Vec<String> = chunks.iter().map(|(id, _)| id.clone()).collect();
        let contents: Vec<String> = chunks.iter().map(|(_, content)| content.clone()).collect();

        let embeddings = embedder.embed_batch(&contents).await?;
        if embeddings.len() != chunk_ids.len() {
            return Err(OpsearchError::Embedding(format!(
                "Embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunk_ids.len()
            )));
        }

        let mut vectors = Vec::with_capacity(chunk_ids.len() * dimension);
        for mut row in embeddings {
            if row.len() != dimension {
                return Err(OpsearchError::Embedding(format!(
                    "Unexpected embedding dimension: expected {}, got {}",
                    dimension,
                    row.len()
                )));
            }
            l2_normalize(&mut row);
            vectors.extend_from_slice(&row);
        }

        Ok(Self {
            dimension,
            model_name: embedder.model_name().to_string(),
            chunk_ids,
            vectors,
        })
    }

    /// Search with an already-embedded query vector.
    ///
    /// Returns at most `top_k` `(chunk_id, score)` pairs by descending inner
    /// product; equal scores resolve by ascending ordinal.
    pub fn search_by_vector(&self, query_vec: &[f32], top_k: usize) -> Result<Vec<(String, f32)>> {
        if query_vec.len() != self.dimension {
            return Err(OpsearchError::DimensionMismatch {
                index_dim: self.dimension,
                model_dim: query_vec.len(),
            });
        }

        if top_k == 0 || self.chunk_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = Vec::with_capacity(self.chunk_ids.len());
        for ordinal in 0..self.chunk_ids.len() {
            let row = &self.vectors[ordinal * self.dimension..(ordinal + 1) * self.dimension];
            let score: f32 = row.iter().zip(query_vec.iter()).map(|(x, y)| x * y).sum();
            scored.push((ordinal, score));
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(ordinal, score)| (self.chunk_ids[ordinal].clone(), score))
            .collect())
    }

    /// Embed the query text and search.
    pub async fn search(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<(String, f32)>> {
        let embed_start = std::time::Instant::now();
        let query_vec = embedder.embed_query(query).await?;
        log::debug!("Dense search: query embedding took {:?}", embed_start.elapsed());

        self.search_by_vector(&query_vec, top_k)
    }

    /// Persist the matrix and its sidecar.
    ///
    /// The matrix file holds raw little-endian f32 rows; the sidecar records
    /// chunk ids, dimension and model name for compatibility checks on load.
    pub fn save(&self, matrix_path: &Path, id_map_path: &Path) -> Result<()> {
        for path in [matrix_path, id_map_path] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut bytes = Vec::with_capacity(self.vectors.len() * 4);
        for value in &self.vectors {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        std::fs::write(matrix_path, bytes)?;

        let sidecar = ChunkIdMap {
            chunk_ids: self.chunk_ids.clone(),
            embedding_dim: self.dimension,
            model_name: self.model_name.clone(),
        };
        std::fs::write(id_map_path, serde_json::to_string(&sidecar)?)?;

        Ok(())
    }

    /// Load matrix + sidecar, rejecting indexes that do not match the
    /// current model's output dimension.
    pub fn load(matrix_path: &Path, id_map_path: &Path, model_dim: usize) -> Result<Self> {
        let raw_map = std::fs::read_to_string(id_map_path)?;
        let sidecar: ChunkIdMap = serde_json::from_str(&raw_map).map_err(|e| {
            OpsearchError::IndexCorrupt(format!("{}: {}", id_map_path.display(), e))
        })?;

        if sidecar.embedding_dim != model_dim {
            return Err(OpsearchError::DimensionMismatch {
                index_dim: sidecar.embedding_dim,
                model_dim,
            });
        }

        let bytes = std::fs::read(matrix_path)?;
        let expected_len = sidecar.chunk_ids.len() * sidecar.embedding_dim * 4;
        if bytes.len() != expected_len {
            return Err(OpsearchError::IndexCorrupt(format!(
                "{}: expected {} bytes for {} x {} matrix, found {}",
                matrix_path.display(),
                expected_len,
                sidecar.chunk_ids.len(),
                sidecar.embedding_dim,
                bytes.len()
            )));
        }

        let vectors: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self {
            dimension: sidecar.embedding_dim,
            model_name: sidecar.model_name,
            chunk_ids: sidecar.chunk_ids,
            vectors,
        })
    }

    /// Number of indexed chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunk_ids.len()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Deterministic embedder: hashes each text into a fixed unit vector.
    /// Texts sharing a prefix land close together, which is enough to
    /// exercise ranking without a model.
    struct StubEmbedder {
        dimension: usize,
    }

    impl StubEmbedder {
        fn vector_for(&self, text: &str) -> Vec<f32> {
            let mut v = vec![0.0f32; self.dimension];
            for (i, byte) in text.bytes().enumerate() {
                v[i % self.dimension] += byte as f32;
            }
            crate::embeddings::l2_normalize(&mut v);
            v
        }
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub-embedder"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| self.vector_for(t)).collect())
        }
    }

    fn chunk(id: &str, content: &str) -> (String, String) {
        (id.to_string(), content.to_string())
    }

    #[tokio::test]
    async fn test_build_and_exact_match_ranks_first() {
        let embedder = StubEmbedder { dimension: 8 };
        let chunks = vec![
            chunk("c1", "pod crash loop"),
            chunk("c2", "disk pressure eviction"),
            chunk("c3", "network partition recovery"),
        ];
        let index = DenseIndex::build(&chunks, &embedder).await.unwrap();
        assert_eq!(index.chunk_count(), 3);
        assert_eq!(index.model_name(), "stub-embedder");

        // An identical text embeds to the identical vector: score 1.0.
        let results = index.search(&embedder, "pod crash loop", 3).await.unwrap();
        assert_eq!(results[0].0, "c1");
        assert!((results[0].1 - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_search_scores_descending_and_limited() {
        let embedder = StubEmbedder { dimension: 8 };
        let chunks = vec![
            chunk("c1", "alpha"),
            chunk("c2", "beta"),
            chunk("c3", "gamma"),
            chunk("c4", "delta"),
        ];
        let index = DenseIndex::build(&chunks, &embedder).await.unwrap();

        let results = index.search(&embedder, "alpha", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].1 >= results[1].1);
    }

    #[tokio::test]
    async fn test_tie_break_by_ordinal() {
        let embedder = StubEmbedder { dimension: 8 };
        // Identical contents embed identically: tie resolves to build order.
        let chunks = vec![
            chunk("first", "same text"),
            chunk("second", "same text"),
        ];
        let index = DenseIndex::build(&chunks, &embedder).await.unwrap();

        let results = index.search(&embedder, "same text", 2).await.unwrap();
        assert_eq!(results[0].0, "first");
        assert_eq!(results[1].0, "second");
    }

    #[tokio::test]
    async fn test_rows_are_unit_norm() {
        let embedder = StubEmbedder { dimension: 4 };
        let chunks = vec![chunk("c1", "anything at all")];
        let index = DenseIndex::build(&chunks, &embedder).await.unwrap();

        let row = &index.vectors[0..4];
        let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_empty_build_is_ready_but_empty() {
        let embedder = StubEmbedder { dimension: 4 };
        let index = DenseIndex::build(&[], &embedder).await.unwrap();
        assert_eq!(index.chunk_count(), 0);
        assert!(index
            .search(&embedder, "anything", 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_save_load_search_equivalence() {
        let temp_dir = TempDir::new().unwrap();
        let matrix_path = temp_dir.path().join("vectors.faiss");
        let id_map_path = temp_dir.path().join("chunk_id_map.json");

        let embedder = StubEmbedder { dimension: 8 };
        let chunks = vec![
            chunk("c1", "pod crash loop"),
            chunk("c2", "disk pressure eviction"),
        ];
        let built = DenseIndex::build(&chunks, &embedder).await.unwrap();
        built.save(&matrix_path, &id_map_path).unwrap();

        let loaded = DenseIndex::load(&matrix_path, &id_map_path, 8).unwrap();
        assert_eq!(loaded.chunk_count(), 2);
        assert_eq!(loaded.model_name(), "stub-embedder");

        let query = embedder.vector_for("pod crash loop");
        assert_eq!(
            built.search_by_vector(&query, 5).unwrap(),
            loaded.search_by_vector(&query, 5).unwrap()
        );
    }

    #[tokio::test]
    async fn test_load_rejects_dimension_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let matrix_path = temp_dir.path().join("vectors.faiss");
        let id_map_path = temp_dir.path().join("chunk_id_map.json");

        let embedder = StubEmbedder { dimension: 8 };
        let index = DenseIndex::build(&[chunk("c1", "text")], &embedder)
            .await
            .unwrap();
        index.save(&matrix_path, &id_map_path).unwrap();

        let result = DenseIndex::load(&matrix_path, &id_map_path, 1536);
        assert!(matches!(
            result,
            Err(OpsearchError::DimensionMismatch {
                index_dim: 8,
                model_dim: 1536
            })
        ));
    }

    #[tokio::test]
    async fn test_load_rejects_truncated_matrix() {
        let temp_dir = TempDir::new().unwrap();
        let matrix_path = temp_dir.path().join("vectors.faiss");
        let id_map_path = temp_dir.path().join("chunk_id_map.json");

        let embedder = StubEmbedder { dimension: 8 };
        let index = DenseIndex::build(&[chunk("c1", "text")], &embedder)
            .await
            .unwrap();
        index.save(&matrix_path, &id_map_path).unwrap();

        // Chop the matrix mid-row
        let bytes = std::fs::read(&matrix_path).unwrap();
        std::fs::write(&matrix_path, &bytes[..bytes.len() - 4]).unwrap();

        let result = DenseIndex::load(&matrix_path, &id_map_path, 8);
        assert!(matches!(result, Err(OpsearchError::IndexCorrupt(_))));
    }

    #[test]
    fn test_search_by_vector_rejects_wrong_dimension() {
        let index = DenseIndex {
            dimension: 4,
            model_name: "stub".to_string(),
            chunk_ids: vec!["c1".to_string()],
            vectors: vec![1.0, 0.0, 0.0, 0.0],
        };
        let result = index.search_by_vector(&[1.0, 0.0], 5);
        assert!(matches!(
            result,
            Err(OpsearchError::DimensionMismatch { .. })
        ));
    }
}
