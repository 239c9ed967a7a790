//! In-memory [`VectorStore`] for tests and throwaway knowledge bases.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{rank_scored, ScoredChunk, VectorStore};
use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::Chunk;

/// Chunks keyed by id behind one `RwLock`; every mutation takes a single write guard.
#[derive(Default)]
pub struct InMemoryVectorStore {
    chunks: RwLock<HashMap<String, Chunk>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> RagError {
    RagError::StoreUnavailable("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        let mut stored = self.chunks.write().map_err(poisoned)?;
        for c in chunks {
            stored.insert(c.id.clone(), c.clone());
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut stored = self.chunks.write().map_err(poisoned)?;
        for id in ids {
            stored.remove(id);
        }
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let stored = self.chunks.read().map_err(poisoned)?;
        let scored = stored
            .values()
            .filter(|c| c.embedding.len() == query.len())
            .map(|c| ScoredChunk {
                score: cosine_similarity(query, &c.embedding),
                chunk: c.clone(),
            })
            .collect();
        Ok(rank_scored(scored, k))
    }

    async fn replace(&self, remove_ids: &[String], upserts: &[Chunk]) -> Result<()> {
        let mut stored = self.chunks.write().map_err(poisoned)?;
        for id in remove_ids {
            stored.remove(id);
        }
        for c in upserts {
            stored.insert(c.id.clone(), c.clone());
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.chunks.read().map_err(poisoned)?.len())
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        let stored = self.chunks.read().map_err(poisoned)?;
        Ok(ids.iter().filter_map(|id| stored.get(id).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, path: &str, v: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            source_path: path.to_string(),
            chunk_index: 0,
            text: format!("text of {}", id),
            embedding: v,
        }
    }

    #[tokio::test]
    async fn search_orders_by_similarity_and_truncates() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(&[
                chunk("a", "a.txt", vec![1.0, 0.0]),
                chunk("b", "b.txt", vec![0.0, 1.0]),
                chunk("c", "c.txt", vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id, "a");
        assert_eq!(hits[1].chunk.id, "c");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn replace_removes_stale_and_adds_new() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(&[chunk("old", "a.txt", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .replace(&["old".to_string()], &[chunk("new", "a.txt", vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, "new");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn get_returns_only_stored_ids() {
        let store = InMemoryVectorStore::new();
        store.upsert(&[chunk("a", "a.txt", vec![1.0])]).await.unwrap();
        let found = store
            .get(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");
    }

    #[tokio::test]
    async fn delete_ignores_unknown_ids() {
        let store = InMemoryVectorStore::new();
        store.upsert(&[chunk("a", "a.txt", vec![1.0])]).await.unwrap();
        store
            .delete(&["a".to_string(), "zzz".to_string()])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_record_write_restores_previous_chunks() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = crate::db::connect(&tmp.path().join("m.sqlite")).await.unwrap();
        crate::migrate::migrate(&pool).await.unwrap();
        let meta = crate::metadata::MetadataStore::new(pool.clone());
        sqlx::query(
            "CREATE TRIGGER sources_read_only BEFORE INSERT ON sources
             BEGIN SELECT RAISE(ABORT, 'sources is read-only'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let store = InMemoryVectorStore::new();
        store
            .upsert(&[chunk("kept", "a.txt", vec![1.0]), chunk("old", "a.txt", vec![0.5])])
            .await
            .unwrap();

        let mut changed = chunk("kept", "a.txt", vec![0.0]);
        changed.text = "rewritten".to_string();
        let ids = vec!["kept".to_string(), "new".to_string()];
        let entry = crate::metadata::SourceEntry {
            path: "a.txt",
            fingerprint: "f",
            chunk_ids: &ids,
            embedding_model: "test",
            embedding_dims: 1,
        };
        let result = store
            .replace_recorded(
                &["old".to_string()],
                &[changed, chunk("new", "a.txt", vec![1.0])],
                &meta,
                &entry,
            )
            .await;
        assert!(result.is_err());

        let mut restored = store
            .get(&["kept".to_string(), "old".to_string(), "new".to_string()])
            .await
            .unwrap();
        restored.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].id, "kept");
        assert_eq!(restored[0].text, "text of kept");
        assert_eq!(restored[1].id, "old");
        assert!(meta.get("a.txt").await.unwrap().is_none());
    }
}
