//! Offline service implementations: a feature-hashing embedder and a
//! JSON-lines document store on disk.

use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use super::record::EmbeddingRecord;
use super::service::{DocumentStore, EmbeddingService, ServiceError};

/// Embeds a text as its hashed bag of lowercase words, L2-normalized.
///
/// Each word lands in one of `dimensions` buckets with a sign, both taken from
/// its SHA-256 digest, so equal texts always get equal vectors.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    pub dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            vector[idx] += if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl EmbeddingService for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if self.dimensions == 0 {
            return Err(ServiceError::Failed("embedding dimensions must be positive".to_string()));
        }
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// Document store keeping each index as `{dir}/{index}.jsonl`, one record per line.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    dir: PathBuf,
}

impl JsonlStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn index_path(&self, index: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", index))
    }
}

fn io_failure(path: &Path, e: std::io::Error) -> ServiceError {
    ServiceError::Failed(format!("{}: {}", path.display(), e))
}

impl DocumentStore for JsonlStore {
    async fn add_documents(&self, index: &str, records: &[EmbeddingRecord]) -> Result<(), ServiceError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| io_failure(&self.dir, e))?;
        let path = self.index_path(index);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_failure(&path, e))?;
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record).map_err(|e| ServiceError::Failed(e.to_string()))?;
            buf.push(b'\n');
        }
        file.write_all(&buf).map_err(|e| io_failure(&path, e))?;
        debug!(index = index, records = records.len(), "appended records");
        Ok(())
    }

    async fn swap_indexes(&self, first: &str, second: &str) -> Result<(), ServiceError> {
        let first_path = self.index_path(first);
        let second_path = self.index_path(second);
        let parked = self.index_path(&format!("{}.swap", first));
        let rename = |from: &Path, to: &Path| {
            if from.exists() {
                std::fs::rename(from, to).map_err(|e| io_failure(from, e))
            } else {
                Ok(())
            }
        };
        rename(&first_path, &parked)?;
        rename(&second_path, &first_path)?;
        rename(&parked, &second_path)
    }

    async fn delete_index(&self, index: &str) -> Result<(), ServiceError> {
        let path = self.index_path(index);
        match std::fs::remove_file(&path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(io_failure(&path, e)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, ChunkKind};

    fn ids(store: &JsonlStore, index: &str) -> Vec<String> {
        let path = store.index_path(index);
        if !path.exists() {
            return Vec::new();
        }
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str::<EmbeddingRecord>(line).unwrap().id)
            .collect()
    }

    fn record(id: &str) -> EmbeddingRecord {
        let chunk = Chunk {
            text: format!("Text of {}.", id),
            source: "page#intro".to_string(),
            library: "pkg".to_string(),
            page_title: "Page".to_string(),
            headings: vec!["# Page".to_string()],
            kind: ChunkKind::Prose,
        };
        EmbeddingRecord::new(id.to_string(), &chunk, vec![1.0, 0.0])
    }

    #[tokio::test]
    async fn test_hashing_embedder() {
        let embedder = HashingEmbedder::new(64);
        let texts = vec!["Load the model".to_string(), "load THE model!".to_string(), String::new()];
        let vectors = embedder.embed(&texts).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0].len(), 64);
        assert_eq!(vectors[0], vectors[1]);
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(vectors[2].iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_zero_dimensions_fail() {
        let result = HashingEmbedder::new(0).embed(&["x".to_string()]).await;
        assert!(matches!(result, Err(ServiceError::Failed(_))));
    }

    #[tokio::test]
    async fn test_jsonl_store_swap_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path().join("index"));

        store.add_documents("docs", &[record("old")]).await.unwrap();
        store.add_documents("docs-tmp", &[record("a")]).await.unwrap();
        store.add_documents("docs-tmp", &[record("b")]).await.unwrap();
        store.swap_indexes("docs", "docs-tmp").await.unwrap();

        assert_eq!(ids(&store, "docs"), vec!["a", "b"]);
        assert_eq!(ids(&store, "docs-tmp"), vec!["old"]);

        store.delete_index("docs-tmp").await.unwrap();
        store.delete_index("docs-tmp").await.unwrap();
        assert!(!store.index_path("docs-tmp").exists());
        assert!(ids(&store, "docs-tmp").is_empty());
    }

    #[tokio::test]
    async fn test_swap_into_missing_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path());
        store.add_documents("docs-tmp", &[record("a")]).await.unwrap();
        store.swap_indexes("docs", "docs-tmp").await.unwrap();
        assert_eq!(ids(&store, "docs"), vec!["a"]);
        assert!(!store.index_path("docs-tmp").exists());
    }
}
