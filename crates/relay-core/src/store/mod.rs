//! Embedding store abstraction.
//!
//! The [`EmbeddingStore`] trait is the seam between retrieval and
//! persistence. Stores are append-only: documents are never updated in
//! place, and adding a document whose id already exists appends a second
//! physical record.
//!
//! Querying is an exact linear scan ([`rank_top_k`]): every stored vector
//! is compared against the query. Stores are expected to hold at most a few
//! thousand chunks.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::embedding::cosine_similarity;
use crate::models::RagDocument;

/// Failures raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt store record at {path}:{line}: {message}")]
    Corrupt {
        path: String,
        line: usize,
        message: String,
    },
    #[error("embedding of record {id} has a non-finite component")]
    NonFinite { id: String },
    #[error("embedding has {actual} dimensions, store holds {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("failed to encode store record {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Append-only collection of embedded documents with exact top-k search.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Append documents in the given order.
    async fn add_many(&self, docs: Vec<RagDocument>) -> Result<(), StoreError>;

    /// Return the `k` most similar documents (at least one when non-empty).
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RagDocument>, StoreError>;

    /// Number of stored records.
    async fn len(&self) -> Result<usize, StoreError>;

    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }
}

/// Common dimensionality of `docs`, or `None` when empty.
pub fn dimensions(docs: &[RagDocument]) -> Result<Option<usize>, StoreError> {
    let Some(first) = docs.first() else {
        return Ok(None);
    };
    let expected = first.embedding.len();
    for doc in &docs[1..] {
        if doc.embedding.len() != expected {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: doc.embedding.len(),
            });
        }
    }
    Ok(Some(expected))
}

/// True when every embedding component is a finite number.
pub fn is_finite(doc: &RagDocument) -> bool {
    doc.embedding.iter().all(|v| v.is_finite())
}

/// Check that `incoming` can be appended to a store holding `existing`.
pub fn check_append(existing: &[RagDocument], incoming: &[RagDocument]) -> Result<(), StoreError> {
    if let Some(bad) = incoming.iter().find(|d| !is_finite(d)) {
        return Err(StoreError::NonFinite { id: bad.id.clone() });
    }
    let incoming_dims = dimensions(incoming)?;
    match (existing.first(), incoming_dims) {
        (Some(first), Some(dims)) if first.embedding.len() != dims => {
            Err(StoreError::DimensionMismatch {
                expected: first.embedding.len(),
                actual: dims,
            })
        }
        _ => Ok(()),
    }
}

/// Rank `docs` against `query` and return `(index, similarity)` pairs for
/// the best `k` (floored to 1), best first.
///
/// Ties keep insertion order. An empty store returns an empty list for any
/// `k`; a query whose length differs from the stored vectors is rejected.
pub fn rank_top_k(
    docs: &[RagDocument],
    query: &[f32],
    k: usize,
) -> Result<Vec<(usize, f32)>, StoreError> {
    if docs.is_empty() {
        return Ok(Vec::new());
    }

    let mut scored: Vec<(usize, f32)> = Vec::with_capacity(docs.len());
    for (i, doc) in docs.iter().enumerate() {
        if doc.embedding.len() != query.len() {
            return Err(StoreError::DimensionMismatch {
                expected: doc.embedding.len(),
                actual: query.len(),
            });
        }
        scored.push((i, cosine_similarity(&doc.embedding, query)));
    }

    // Stable sort: equal scores stay in insertion order. `total_cmp` keeps
    // the order total even if a NaN score slips through.
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k.max(1));
    Ok(scored)
}
