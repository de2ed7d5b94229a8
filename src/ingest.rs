//! Bulk ingestion of a directory tree into the embedding store.
//!
//! Walk → filter → chunk → embed in batches → `add_many`. Files matching
//! `[rag].exclude_globs` (case-insensitive) are skipped, as are files that
//! cannot be read as UTF-8 text.

use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use relay_core::chunk::{chunk_id, chunk_text};
use relay_core::embedding::Embedder;
use relay_core::models::{RagDocument, RagMetadata};
use relay_core::store::EmbeddingStore;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::Config;

/// A chunk waiting for its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChunk {
    pub id: String,
    pub text: String,
    pub source: String,
    pub title: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestSummary {
    pub files_read: usize,
    pub files_skipped: usize,
    pub chunks: usize,
    pub embedded: usize,
}

/// Collect non-blank chunks from every eligible file under `root`.
///
/// Files are visited in file-name order. Chunk ids hash the file path as
/// walked (including `root`) with the chunk's index in that file, so
/// re-ingesting the same tree yields the same ids.
pub fn collect_chunks(
    root: &Path,
    config: &Config,
    summary: &mut IngestSummary,
) -> Result<Vec<PendingChunk>> {
    if !root.exists() {
        bail!("Ingest root does not exist: {}", root.display());
    }
    let exclude_set = build_globset(&config.rag.exclude_globs)?;

    let mut chunks = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                summary.files_skipped += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) {
            debug!(path = %path.display(), "excluded");
            summary.files_skipped += 1;
            continue;
        }

        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping non-text file");
                summary.files_skipped += 1;
                continue;
            }
        };
        summary.files_read += 1;

        let source = path.to_string_lossy().to_string();
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        for (i, chunk) in chunk_text(&text, config.rag.chunk_size, config.rag.chunk_overlap)
            .into_iter()
            .enumerate()
        {
            if chunk.trim().is_empty() {
                continue;
            }
            chunks.push(PendingChunk {
                id: chunk_id(&source, i),
                text: chunk,
                source: source.clone(),
                title: title.clone(),
            });
        }
    }

    summary.chunks = chunks.len();
    Ok(chunks)
}

/// Ingest `root` into `store`. With `dry_run`, nothing is embedded or
/// written.
pub async fn run_ingest(
    config: &Config,
    root: &Path,
    dry_run: bool,
    embedder: Option<&dyn Embedder>,
    store: &dyn EmbeddingStore,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();
    let chunks = collect_chunks(root, config, &mut summary)?;
    if chunks.is_empty() || dry_run {
        return Ok(summary);
    }

    let embedder = embedder.context("An embedding backend is required to ingest")?;
    let mut docs = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(config.embedding.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed(&texts)
            .await
            .context("Embedding request failed")?;
        if vectors.len() != batch.len() {
            bail!(
                "Embedding backend returned {} vectors for {} inputs",
                vectors.len(),
                batch.len()
            );
        }
        for (chunk, embedding) in batch.iter().zip(vectors) {
            docs.push(RagDocument {
                id: chunk.id.clone(),
                text: chunk.text.clone(),
                metadata: RagMetadata {
                    source: Some(chunk.source.clone()),
                    title: Some(chunk.title.clone()),
                    ..Default::default()
                },
                embedding,
            });
        }
        debug!(
            model = embedder.model_name(),
            embedded = docs.len(),
            total = chunks.len(),
            "batch embedded"
        );
    }

    summary.embedded = docs.len();
    store
        .add_many(docs)
        .await
        .context("Failed to append to embedding store")?;
    Ok(summary)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("Invalid exclude glob: {}", pattern))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_core::store::memory::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct LengthEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for LengthEmbedder {
        fn model_name(&self) -> &str {
            "length"
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| vec![t.chars().count() as f32, 1.0])
                .collect())
        }
    }

    fn config(chunk_size: usize, overlap: usize, batch: usize) -> Config {
        let mut cfg = Config::default();
        cfg.rag.chunk_size = chunk_size;
        cfg.rag.chunk_overlap = overlap;
        cfg.embedding.batch_size = batch;
        cfg
    }

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("faq")).unwrap();
        std::fs::write(tmp.path().join("faq").join("hours.md"), "abcdefghij").unwrap();
        std::fs::write(tmp.path().join("blank.txt"), "   \n\t").unwrap();
        std::fs::write(tmp.path().join("logo.PNG"), "not really an image").unwrap();
        std::fs::write(tmp.path().join("binary.dat"), [0xffu8, 0xfe, 0x00]).unwrap();
        tmp
    }

    #[test]
    fn test_collect_filters_and_chunks() {
        let tmp = tree();
        let mut summary = IngestSummary::default();
        let chunks = collect_chunks(tmp.path(), &config(4, 1, 64), &mut summary).unwrap();

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "defg", "ghij"]);
        assert!(chunks.iter().all(|c| c.title == "hours.md"));
        assert_eq!(summary.files_read, 2);
        assert_eq!(summary.files_skipped, 2);
        assert_eq!(summary.chunks, 3);

        let source = &chunks[0].source;
        assert_eq!(chunks[1].id, chunk_id(source, 1));
    }

    #[test]
    fn test_missing_root_is_error() {
        let tmp = TempDir::new().unwrap();
        let mut summary = IngestSummary::default();
        assert!(collect_chunks(&tmp.path().join("nope"), &config(4, 1, 64), &mut summary).is_err());
    }

    #[tokio::test]
    async fn test_ingest_embeds_in_batches() {
        let tmp = tree();
        let embedder = LengthEmbedder {
            calls: AtomicUsize::new(0),
        };
        let store = InMemoryStore::new();
        let summary = run_ingest(&config(4, 1, 2), tmp.path(), false, Some(&embedder), &store)
            .await
            .unwrap();

        assert_eq!(summary.embedded, 3);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let tmp = tree();
        let store = InMemoryStore::new();
        let summary = run_ingest(&config(4, 1, 2), tmp.path(), true, None, &store)
            .await
            .unwrap();
        assert_eq!(summary.chunks, 3);
        assert_eq!(summary.embedded, 0);
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_reingest_appends_duplicates() {
        let tmp = tree();
        let embedder = LengthEmbedder {
            calls: AtomicUsize::new(0),
        };
        let store = InMemoryStore::new();
        let cfg = config(4, 1, 64);
        run_ingest(&cfg, tmp.path(), false, Some(&embedder), &store)
            .await
            .unwrap();
        run_ingest(&cfg, tmp.path(), false, Some(&embedder), &store)
            .await
            .unwrap();
        assert_eq!(store.len().await.unwrap(), 6);
    }
}
