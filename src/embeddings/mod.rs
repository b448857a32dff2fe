pub mod http;

pub use http::HttpEmbedder;

use crate::error::Result;
use async_trait::async_trait;

/// Opaque embedding model: text in, unit-norm vector of fixed dimension out.
///
/// The retrieval runtime treats the model as an external collaborator; any
/// implementation must return vectors of exactly `dimension()` components
/// with L2 norm 1 (use [`l2_normalize`]).
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded alongside persisted dense indexes.
    fn model_name(&self) -> &str;

    /// Output vector dimension.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let input = [text.to_string()];
        let mut vectors = self.embed_batch(&input).await?;
        vectors
            .pop()
            .ok_or_else(|| crate::error::OpsearchError::Embedding("empty embedding response".into()))
    }
}

/// Scale a vector to unit L2 norm in place. Zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
