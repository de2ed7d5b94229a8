//! Embedding backend trait and vector similarity.
//!
//! Concrete backends (the OpenAI-compatible `/embeddings` client) live in
//! the application crate; this module only defines the seam and the pure
//! similarity function used by every store.

use anyhow::Result;
use async_trait::async_trait;

/// Floor applied to the cosine denominator so zero-norm vectors score `0.0`
/// instead of dividing by zero.
pub const SIMILARITY_EPSILON: f32 = 1e-8;

/// A backend that turns texts into embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embed a batch, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// Cosine similarity between two equal-length vectors.
///
/// The denominator is floored to [`SIMILARITY_EPSILON`]. Callers must check
/// lengths first; mismatched lengths only compare the shared prefix.
///
/// ```rust
/// use relay_core::embedding::cosine_similarity;
///
/// assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
/// assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    dot / denom.max(SIMILARITY_EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_is_finite() {
        let sim = cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]);
        assert_eq!(sim, 0.0);
        assert!(sim.is_finite());
    }

    struct Fixed;

    #[async_trait]
    impl Embedder for Fixed {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    #[tokio::test]
    async fn test_embed_one_unwraps_single_batch() {
        let v = Fixed.embed_one("abcd").await.unwrap();
        assert_eq!(v, vec![4.0]);
    }
}
