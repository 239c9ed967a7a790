//! Persistent [`VectorStore`] over the `chunk_vectors` table.
//!
//! Vectors are stored as little-endian `f32` BLOBs and scored in process.
//! Writes for one file go through a single transaction together with its
//! `sources` row, so WAL readers see either the previous chunk set and record
//! or the new ones.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::{rank_scored, ScoredChunk, VectorStore};
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::Result;
use crate::metadata::{write_entry, MetadataStore, SourceEntry};
use crate::models::Chunk;

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

async fn insert_chunk(conn: &mut sqlx::SqliteConnection, chunk: &Chunk) -> Result<()> {
    sqlx::query(
        "INSERT INTO chunk_vectors (id, source_path, chunk_index, text, dims, embedding)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            source_path = excluded.source_path,
            chunk_index = excluded.chunk_index,
            text = excluded.text,
            dims = excluded.dims,
            embedding = excluded.embedding",
    )
    .bind(&chunk.id)
    .bind(&chunk.source_path)
    .bind(chunk.chunk_index)
    .bind(&chunk.text)
    .bind(chunk.embedding.len() as i64)
    .bind(vec_to_blob(&chunk.embedding))
    .execute(conn)
    .await?;
    Ok(())
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    let blob: Vec<u8> = row.get("embedding");
    Chunk {
        id: row.get("id"),
        source_path: row.get("source_path"),
        chunk_index: row.get("chunk_index"),
        text: row.get("text"),
        embedding: blob_to_vec(&blob),
    }
}

async fn delete_chunk(conn: &mut sqlx::SqliteConnection, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM chunk_vectors WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        self.replace(&[], chunks).await
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        self.replace(ids, &[]).await
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            "SELECT id, source_path, chunk_index, text, embedding FROM chunk_vectors WHERE dims = ?",
        )
        .bind(query.len() as i64)
        .fetch_all(&self.pool)
        .await?;

        let scored = rows
            .iter()
            .map(|row| {
                let chunk = chunk_from_row(row);
                ScoredChunk {
                    score: cosine_similarity(query, &chunk.embedding),
                    chunk,
                }
            })
            .collect();

        Ok(rank_scored(scored, k))
    }

    async fn replace(&self, remove_ids: &[String], upserts: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in remove_ids {
            delete_chunk(&mut tx, id).await?;
        }
        for chunk in upserts {
            insert_chunk(&mut tx, chunk).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query(
                "SELECT id, source_path, chunk_index, text, embedding FROM chunk_vectors WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(row) = row {
                found.push(chunk_from_row(&row));
            }
        }
        Ok(found)
    }

    /// The `sources` table shares this database, so the swap and the record
    /// commit or roll back together.
    async fn replace_recorded(
        &self,
        remove_ids: &[String],
        upserts: &[Chunk],
        _metadata: &MetadataStore,
        entry: &SourceEntry<'_>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in remove_ids {
            delete_chunk(&mut tx, id).await?;
        }
        for chunk in upserts {
            insert_chunk(&mut tx, chunk).await?;
        }
        write_entry(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store(tmp: &TempDir) -> SqliteVectorStore {
        SqliteVectorStore::new(pool(tmp).await)
    }

    async fn pool(tmp: &TempDir) -> sqlx::SqlitePool {
        let pool = crate::db::connect(&tmp.path().join("v.sqlite")).await.unwrap();
        crate::migrate::migrate(&pool).await.unwrap();
        pool
    }

    fn entry<'a>(ids: &'a [String]) -> SourceEntry<'a> {
        SourceEntry {
            path: "doc.txt",
            fingerprint: "f",
            chunk_ids: ids,
            embedding_model: "test",
            embedding_dims: 1,
        }
    }

    fn chunk(id: &str, v: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            source_path: "doc.txt".to_string(),
            chunk_index: 0,
            text: id.to_uppercase(),
            embedding: v,
        }
    }

    #[tokio::test]
    async fn roundtrip_and_rank() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp).await;
        s.upsert(&[chunk("x", vec![1.0, 0.0]), chunk("y", vec![0.6, 0.8])])
            .await
            .unwrap();

        let hits = s.search(&[0.0, 1.0], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id, "y");
        assert_eq!(hits[0].chunk.text, "Y");
        assert_eq!(hits[0].chunk.embedding, vec![0.6, 0.8]);
    }

    #[tokio::test]
    async fn replace_is_applied_together() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp).await;
        s.upsert(&[chunk("a", vec![1.0]), chunk("b", vec![1.0])])
            .await
            .unwrap();
        s.replace(&["a".to_string()], &[chunk("c", vec![1.0])])
            .await
            .unwrap();

        let mut ids: Vec<String> = s
            .search(&[1.0], 10)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.chunk.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn mismatched_dims_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp).await;
        s.upsert(&[chunk("two", vec![1.0, 0.0]), chunk("three", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        let hits = s.search(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(s.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn replace_recorded_writes_chunks_and_record_together() {
        let tmp = TempDir::new().unwrap();
        let pool = pool(&tmp).await;
        let s = SqliteVectorStore::new(pool.clone());
        let meta = MetadataStore::new(pool);
        let ids = vec!["a".to_string()];

        s.replace_recorded(&[], &[chunk("a", vec![1.0])], &meta, &entry(&ids))
            .await
            .unwrap();
        assert_eq!(s.count().await.unwrap(), 1);
        assert_eq!(meta.get("doc.txt").await.unwrap().unwrap().chunk_ids, ids);
    }

    #[tokio::test]
    async fn failed_record_write_rolls_back_the_chunk_swap() {
        let tmp = TempDir::new().unwrap();
        let pool = pool(&tmp).await;
        let s = SqliteVectorStore::new(pool.clone());
        let meta = MetadataStore::new(pool.clone());
        let old_ids = vec!["a".to_string()];
        s.replace_recorded(&[], &[chunk("a", vec![1.0])], &meta, &entry(&old_ids))
            .await
            .unwrap();

        sqlx::query(
            "CREATE TRIGGER sources_read_only BEFORE UPDATE ON sources
             BEGIN SELECT RAISE(ABORT, 'sources is read-only'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let new_ids = vec!["b".to_string()];
        let result = s
            .replace_recorded(&old_ids, &[chunk("b", vec![1.0])], &meta, &entry(&new_ids))
            .await;
        assert!(result.is_err());

        let stored: Vec<String> = sqlx::query_scalar("SELECT id FROM chunk_vectors")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(stored, old_ids);
        assert_eq!(meta.get("doc.txt").await.unwrap().unwrap().chunk_ids, old_ids);
    }
}
