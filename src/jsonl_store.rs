//! Append-only JSONL embedding store.
//!
//! One [`RagDocument`] per line, `{id, text, metadata, embedding}`, UTF-8.
//! The file is parsed lazily on first access and at most once per
//! instance; later appends by other processes are not seen until a new
//! instance is opened.
//!
//! Every record is written with a single `write_all` on a file opened in
//! append mode, so concurrent writers interleave whole lines and readers
//! never see a torn record.

use async_trait::async_trait;
use relay_core::models::RagDocument;
use relay_core::store::{check_append, is_finite, rank_top_k, EmbeddingStore, StoreError};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct JsonlStore {
    path: PathBuf,
    docs: Mutex<Option<Vec<RagDocument>>>,
}

impl JsonlStore {
    /// Open a store backed by `path`. Nothing is read until first use.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            docs: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    /// Parse the backing file into memory if not done yet.
    ///
    /// A missing file is an empty store. Any malformed line fails the whole
    /// load and leaves the instance unloaded.
    pub async fn load(&self) -> Result<(), StoreError> {
        let mut guard = self.docs.lock().await;
        if guard.is_none() {
            *guard = Some(self.read_all().await?);
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<RagDocument>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "store file absent, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(StoreError::Io {
                    path: self.display_path(),
                    source: e,
                })
            }
        };

        let docs = parse_records(&content, &self.display_path())?;
        info!(path = %self.path.display(), records = docs.len(), "embedding store loaded");
        Ok(docs)
    }

    async fn append_lines(&self, docs: &[RagDocument]) -> Result<(), StoreError> {
        let io_err = |e: std::io::Error| StoreError::Io {
            path: self.display_path(),
            source: e,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;

        for doc in docs {
            let mut line = serde_json::to_string(doc).map_err(|e| StoreError::Encode {
                id: doc.id.clone(),
                source: e,
            })?;
            line.push('\n');
            file.write_all(line.as_bytes()).await.map_err(io_err)?;
        }
        file.flush().await.map_err(io_err)?;
        Ok(())
    }
}

/// Parse JSONL store content. Blank lines are skipped; line numbers are
/// 1-based.
pub fn parse_records(content: &str, path: &str) -> Result<Vec<RagDocument>, StoreError> {
    let mut docs: Vec<RagDocument> = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let doc: RagDocument = serde_json::from_str(line).map_err(|e| StoreError::Corrupt {
            path: path.to_string(),
            line: idx + 1,
            message: e.to_string(),
        })?;
        if !is_finite(&doc) {
            return Err(StoreError::Corrupt {
                path: path.to_string(),
                line: idx + 1,
                message: format!("record {} has a non-finite embedding component", doc.id),
            });
        }
        if let Some(first) = docs.first() {
            if first.embedding.len() != doc.embedding.len() {
                return Err(StoreError::Corrupt {
                    path: path.to_string(),
                    line: idx + 1,
                    message: format!(
                        "embedding has {} dimensions, earlier records have {}",
                        doc.embedding.len(),
                        first.embedding.len()
                    ),
                });
            }
        }
        docs.push(doc);
    }
    Ok(docs)
}

#[async_trait]
impl EmbeddingStore for JsonlStore {
    async fn add_many(&self, docs: Vec<RagDocument>) -> Result<(), StoreError> {
        self.load().await?;
        let mut guard = self.docs.lock().await;
        let stored = guard.get_or_insert_with(Vec::new);
        check_append(stored, &docs)?;

        if docs.is_empty() {
            return Ok(());
        }
        self.append_lines(&docs).await?;
        debug!(path = %self.path.display(), added = docs.len(), "records appended");
        stored.extend(docs);
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RagDocument>, StoreError> {
        self.load().await?;
        let guard = self.docs.lock().await;
        let stored = guard.as_deref().unwrap_or(&[]);
        let ranked = rank_top_k(stored, vector, k)?;
        Ok(ranked.into_iter().map(|(i, _)| stored[i].clone()).collect())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        self.load().await?;
        Ok(self.docs.lock().await.as_ref().map_or(0, Vec::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::models::RagMetadata;
    use tempfile::TempDir;

    fn doc(id: &str, embedding: Vec<f32>) -> RagDocument {
        RagDocument {
            id: id.to_string(),
            text: format!("text of {}", id),
            metadata: RagMetadata {
                source: Some(format!("docs/{}.md", id)),
                title: Some(format!("{}.md", id)),
                ..Default::default()
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = JsonlStore::open(tmp.path().join("none.jsonl"));
        assert_eq!(store.len().await.unwrap(), 0);
        assert!(store.query(&[1.0, 0.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_line_fails_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rag.jsonl");
        let good = serde_json::to_string(&doc("a", vec![1.0])).unwrap();
        std::fs::write(&path, format!("{}\n\n{{\"id\":\"b\",\"text\":\"x\"}}\n", good)).unwrap();

        let store = JsonlStore::open(&path);
        match store.len().await {
            Err(StoreError::Corrupt { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected corrupt error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_mixed_dimensions_are_corrupt() {
        let records = [doc("a", vec![1.0, 0.0]), doc("b", vec![1.0])]
            .iter()
            .map(|d| serde_json::to_string(d).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        let err = parse_records(&records, "rag.jsonl").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { line: 2, .. }));
    }

    #[test]
    fn test_out_of_range_numbers_are_corrupt() {
        let content = "{\"id\":\"a\",\"text\":\"t\",\"embedding\":[1.0,0.5]}\n\
                       {\"id\":\"b\",\"text\":\"t\",\"embedding\":[1e39,1.0]}\n";
        let err = parse_records(content, "rag.jsonl").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { line: 2, .. }));
    }

    #[tokio::test]
    async fn test_append_creates_parent_and_writes_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("rag.jsonl");
        let store = JsonlStore::open(&path);
        assert_eq!(store.path(), path.as_path());
        store
            .add_many(vec![doc("a", vec![1.0, 0.0]), doc("b", vec![0.0, 1.0])])
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"id\":\"a\""));
        assert!(content.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_before_write() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rag.jsonl");
        let store = JsonlStore::open(&path);
        store.add_many(vec![doc("a", vec![1.0, 0.0])]).await.unwrap();

        let err = store.add_many(vec![doc("b", vec![1.0])]).await.unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_does_not_see_later_appends() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rag.jsonl");

        let reader = JsonlStore::open(&path);
        assert_eq!(reader.len().await.unwrap(), 0);

        JsonlStore::open(&path)
            .add_many(vec![doc("a", vec![1.0])])
            .await
            .unwrap();

        assert_eq!(reader.len().await.unwrap(), 0);
        assert_eq!(JsonlStore::open(&path).len().await.unwrap(), 1);
    }
}
