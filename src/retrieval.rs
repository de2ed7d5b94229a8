//! Retrieval service: embed a question, search the store, format context.

use relay_core::embedding::Embedder;
use relay_core::models::{RagDocument, SourceRef};
use relay_core::store::EmbeddingStore;
use serde::Serialize;
use tracing::debug;

use crate::error::RelayError;

pub const CONTEXT_PREAMBLE: &str = "Use the following context to answer the user question.";

/// Formatted context block plus citations in retrieval order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RagContext {
    /// Empty when nothing was retrieved.
    pub context: String,
    pub sources: Vec<SourceRef>,
}

impl RagContext {
    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
    }
}

/// Embed `question` as a single-item batch and return the `top_k` nearest
/// documents as a context block.
pub async fn retrieve(
    embedder: &dyn Embedder,
    store: &dyn EmbeddingStore,
    question: &str,
    top_k: usize,
) -> Result<RagContext, RelayError> {
    let vector = embedder
        .embed_one(question)
        .await
        .map_err(RelayError::embedding)?;
    let docs = store.query(&vector, top_k).await?;
    debug!(model = embedder.model_name(), hits = docs.len(), top_k, "retrieval complete");

    Ok(RagContext {
        context: format_context(&docs),
        sources: docs.iter().map(SourceRef::from).collect(),
    })
}

/// `[i] <title | source | doc-i>\n<text>` sections after the preamble,
/// separated by blank lines. Numbering starts at 1.
pub fn format_context(docs: &[RagDocument]) -> String {
    if docs.is_empty() {
        return String::new();
    }

    let mut sections = Vec::with_capacity(docs.len() + 1);
    sections.push(CONTEXT_PREAMBLE.to_string());
    for (i, doc) in docs.iter().enumerate() {
        let n = i + 1;
        let label = non_empty(doc.metadata.title.as_deref())
            .or_else(|| non_empty(doc.metadata.source.as_deref()))
            .map(str::to_string)
            .unwrap_or_else(|| format!("doc-{}", n));
        sections.push(format!("[{}] {}\n{}", n, label, doc.text));
    }
    sections.join("\n\n")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
