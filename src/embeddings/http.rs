use crate::embeddings::{l2_normalize, Embedder};
use crate::error::{OpsearchError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request structure for the embeddings API
#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

/// Response structure from the embeddings API
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

/// Individual embedding data in API response
#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible embeddings client.
///
/// Handles batch embedding generation with retry logic and rate limiting.
/// Every returned vector is checked against the configured dimension and
/// L2-normalized, satisfying the [`Embedder`] unit-norm contract.
pub struct HttpEmbedder {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    batch_size: usize,
    max_retries: usize,
}

impl HttpEmbedder {
    /// Create a new HTTP embedder.
    ///
    /// # Arguments
    ///
    /// * `api_url` - Embeddings endpoint (e.g. `https://api.openai.com/v1/embeddings`)
    /// * `api_key` - Bearer token for the endpoint
    /// * `model` - Model name (e.g. "text-embedding-3-small")
    /// * `dimension` - Expected output dimension; responses of any other
    ///   shape are rejected
    /// * `batch_size` - Maximum number of texts to send per API request
    pub fn new(
        api_url: String,
        api_key: String,
        model: String,
        dimension: usize,
        batch_size: usize,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_url,
            api_key,
            model,
            dimension,
            batch_size: batch_size.max(1),
            max_retries: 3,
        }
    }

    /// Make a single API request for one batch of texts.
    async fn request_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: texts,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| OpsearchError::Embedding(format!("Network error: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(OpsearchError::Embedding(format!(
                "Embedding API error {}: {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| OpsearchError::Embedding(format!("Failed to parse response: {}", e)))?;

        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }

    /// Make one batch request with retry on transient failures.
    async fn request_batch_with_retry(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let start = std::time::Instant::now();
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.request_batch(texts.clone()).await {
                Ok(embeddings) => {
                    log::debug!(
                        "Embedding API call took {:?} (attempt {})",
                        start.elapsed(),
                        attempt + 1
                    );
                    return Ok(embeddings);
                }
                Err(e) if attempt < self.max_retries => {
                    // Retry on rate limits and server errors only
                    let msg = e.to_string();
                    let should_retry = msg.contains("429")
                        || msg.contains("500")
                        || msg.contains("502")
                        || msg.contains("503")
                        || msg.contains("504");

                    if should_retry {
                        log::warn!("Retry {}/{} after error: {}", attempt + 1, self.max_retries, e);
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        attempt += 1;
                    } else {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Validate shape, then normalize to unit L2 norm.
    fn finalize(&self, mut vectors: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Vec<f32>>> {
        if vectors.len() != expected {
            return Err(OpsearchError::Embedding(format!(
                "Expected {} embeddings, got {}",
                expected,
                vectors.len()
            )));
        }
        for vector in &mut vectors {
            if vector.len() != self.dimension {
                return Err(OpsearchError::Embedding(format!(
                    "Unexpected embedding dimension: expected {}, got {}",
                    self.dimension,
                    vector.len()
                )));
            }
            l2_normalize(vector);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let embeddings = self.request_batch_with_retry(batch.to_vec()).await?;
            let embeddings = self.finalize(embeddings, batch.len())?;
            all_embeddings.extend(embeddings);

            // Small delay between full batches to stay under rate limits
            if batch.len() == self.batch_size {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }

        Ok(all_embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder(dimension: usize, batch_size: usize) -> HttpEmbedder {
        HttpEmbedder::new(
            "http://localhost:9999/v1/embeddings".to_string(),
            "test-key".to_string(),
            "text-embedding-3-small".to_string(),
            dimension,
            batch_size,
        )
    }

    #[test]
    fn test_embedder_metadata() {
        let e = embedder(1536, 32);
        assert_eq!(e.model_name(), "text-embedding-3-small");
        assert_eq!(e.dimension(), 1536);
    }

    #[test]
    fn test_batch_size_floor() {
        let e = embedder(1536, 0);
        assert_eq!(e.batch_size, 1);
    }

    #[test]
    fn test_finalize_normalizes() {
        let e = embedder(2, 32);
        let out = e.finalize(vec![vec![3.0, 4.0]], 1).unwrap();
        let norm: f32 = out[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_finalize_rejects_wrong_dimension() {
        let e = embedder(3, 32);
        let result = e.finalize(vec![vec![1.0, 0.0]], 1);
        assert!(matches!(result, Err(OpsearchError::Embedding(_))));
    }

    #[test]
    fn test_finalize_rejects_wrong_count() {
        let e = embedder(2, 32);
        let result = e.finalize(vec![vec![1.0, 0.0]], 2);
        assert!(matches!(result, Err(OpsearchError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_embed_batch_empty_input() {
        let e = embedder(2, 32);
        let out = e.embed_batch(&[]).await.unwrap();
        assert!(out.is_empty());
    }
}
