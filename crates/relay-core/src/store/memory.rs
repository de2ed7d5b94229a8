//! In-memory [`EmbeddingStore`] for tests and ephemeral deployments.
//!
//! Documents live in a `Vec` behind `std::sync::RwLock`; search is the
//! shared brute-force [`rank_top_k`](super::rank_top_k).

use std::sync::RwLock;

use async_trait::async_trait;

use crate::models::RagDocument;

use super::{check_append, rank_top_k, EmbeddingStore, StoreError};

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<Vec<RagDocument>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(docs: Vec<RagDocument>) -> Self {
        Self {
            docs: RwLock::new(docs),
        }
    }
}

#[async_trait]
impl EmbeddingStore for InMemoryStore {
    async fn add_many(&self, docs: Vec<RagDocument>) -> Result<(), StoreError> {
        let mut stored = self.docs.write().unwrap_or_else(|e| e.into_inner());
        check_append(&stored, &docs)?;
        stored.extend(docs);
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RagDocument>, StoreError> {
        let stored = self.docs.read().unwrap_or_else(|e| e.into_inner());
        let ranked = rank_top_k(&stored, vector, k)?;
        Ok(ranked.into_iter().map(|(i, _)| stored[i].clone()).collect())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.docs.read().unwrap_or_else(|e| e.into_inner()).len())
    }
}
