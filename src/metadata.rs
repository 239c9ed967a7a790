//! Per-source indexing records and change detection.
//!
//! Each indexed file has one row in `sources` holding the SHA-256 of its
//! bytes, the ids of its chunks, the embedding model and width used and the
//! time it was indexed. [`MetadataStore::diff`]
//! compares a candidate path set against those rows; only the indexer
//! mutates them, through [`commit`](MetadataStore::commit) and
//! [`remove`](MetadataStore::remove).

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::{BTreeSet, HashMap};

use crate::error::{RagError, Result};
use crate::models::{FileDiff, SourceRecord};
use crate::reader::FileReader;

/// Scheme for text indexed directly rather than read from a file.
pub const MEMORY_SCHEME: &str = "memory://";

/// SHA-256 of `bytes`, hex encoded.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn is_memory_source(path: &str) -> bool {
    path.starts_with(MEMORY_SCHEME)
}

/// What the indexer records for one source after writing its chunks.
#[derive(Debug, Clone)]
pub struct SourceEntry<'a> {
    pub path: &'a str,
    pub fingerprint: &'a str,
    pub chunk_ids: &'a [String],
    pub embedding_model: &'a str,
    pub embedding_dims: usize,
}

pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Classify `candidates` against the stored records.
    ///
    /// Candidates that cannot be read land in `unreadable`. A record whose
    /// chunks were embedded with another model or vector width counts as
    /// `changed` even when the bytes match. Recorded paths missing from
    /// `candidates` are `deleted`, except `memory://` sources.
    pub async fn diff(
        &self,
        candidates: &BTreeSet<String>,
        reader: &dyn FileReader,
        embedding_model: &str,
        embedding_dims: usize,
    ) -> Result<FileDiff> {
        let stored: HashMap<String, SourceRecord> = self
            .list()
            .await?
            .into_iter()
            .map(|r| (r.path.clone(), r))
            .collect();

        let mut diff = FileDiff::default();
        for path in candidates {
            let bytes = match reader.read(path).await {
                Ok(b) => b,
                Err(e) => {
                    diff.unreadable.push((path.clone(), e.to_string()));
                    continue;
                }
            };
            let fp = fingerprint(&bytes);
            match stored.get(path) {
                None => diff.new.insert(path.clone()),
                Some(old)
                    if old.content_fingerprint != fp
                        || embedded_differently(old, embedding_model, embedding_dims) =>
                {
                    diff.changed.insert(path.clone())
                }
                Some(_) => diff.unchanged.insert(path.clone()),
            };
        }

        for path in stored.keys() {
            if !candidates.contains(path) && !is_memory_source(path) {
                diff.deleted.insert(path.clone());
            }
        }

        Ok(diff)
    }

    pub async fn get(&self, path: &str) -> Result<Option<SourceRecord>> {
        let row = sqlx::query(
            "SELECT path, content_fingerprint, chunk_ids_json, embedding_model, embedding_dims, indexed_at
             FROM sources WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| record_from_row(&r)).transpose()
    }

    /// Every record, ordered by path.
    pub async fn list(&self) -> Result<Vec<SourceRecord>> {
        let rows = sqlx::query(
            "SELECT path, content_fingerprint, chunk_ids_json, embedding_model, embedding_dims, indexed_at
             FROM sources ORDER BY path",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Record `entry` as indexed now.
    pub async fn commit(&self, entry: &SourceEntry<'_>) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        write_entry(&mut conn, entry).await
    }

    pub async fn remove(&self, path: &str) -> Result<()> {
        sqlx::query("DELETE FROM sources WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Upsert the `sources` row for `entry` on `conn`, which may be inside a transaction.
pub(crate) async fn write_entry(conn: &mut SqliteConnection, entry: &SourceEntry<'_>) -> Result<()> {
    let ids_json = serde_json::to_string(entry.chunk_ids)
        .map_err(|e| RagError::StoreUnavailable(e.to_string()))?;

    sqlx::query(
        "INSERT INTO sources (path, content_fingerprint, chunk_ids_json, embedding_model, embedding_dims, indexed_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(path) DO UPDATE SET
            content_fingerprint = excluded.content_fingerprint,
            chunk_ids_json = excluded.chunk_ids_json,
            embedding_model = excluded.embedding_model,
            embedding_dims = excluded.embedding_dims,
            indexed_at = excluded.indexed_at",
    )
    .bind(entry.path)
    .bind(entry.fingerprint)
    .bind(ids_json)
    .bind(entry.embedding_model)
    .bind(entry.embedding_dims as i64)
    .bind(Utc::now().timestamp_millis())
    .execute(conn)
    .await?;
    Ok(())
}

/// A zero width on either side means "unknown" and never forces a re-index.
fn embedded_differently(record: &SourceRecord, model: &str, dims: usize) -> bool {
    record.embedding_model != model
        || (dims > 0 && record.embedding_dims > 0 && record.embedding_dims != dims)
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SourceRecord> {
    let ids_json: String = row.get("chunk_ids_json");
    let chunk_ids: Vec<String> = serde_json::from_str(&ids_json)
        .map_err(|e| RagError::StoreUnavailable(format!("corrupt chunk id list: {}", e)))?;
    let millis: i64 = row.get("indexed_at");
    let dims: i64 = row.get("embedding_dims");

    Ok(SourceRecord {
        path: row.get("path"),
        content_fingerprint: row.get("content_fingerprint"),
        chunk_ids,
        embedding_model: row.get("embedding_model"),
        embedding_dims: dims.max(0) as usize,
        indexed_at: DateTime::from_timestamp_millis(millis).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct MapReader(HashMap<String, Vec<u8>>);

    #[async_trait]
    impl FileReader for MapReader {
        async fn read(&self, path: &str) -> Result<Vec<u8>> {
            self.0.get(path).cloned().ok_or_else(|| RagError::FileUnreadable {
                path: path.to_string(),
                reason: "missing".to_string(),
            })
        }
        async fn list(&self, path: &str) -> Result<crate::reader::Listing> {
            Ok(crate::reader::Listing::of(vec![path.to_string()]))
        }
    }

    async fn store(tmp: &TempDir) -> MetadataStore {
        let pool = crate::db::connect(&tmp.path().join("m.sqlite")).await.unwrap();
        crate::migrate::migrate(&pool).await.unwrap();
        MetadataStore::new(pool)
    }

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|s| s.to_string()).collect()
    }

    async fn record(meta: &MetadataStore, path: &str, fp: &str, ids: &[String]) {
        meta.commit(&SourceEntry {
            path,
            fingerprint: fp,
            chunk_ids: ids,
            embedding_model: "mini",
            embedding_dims: 4,
        })
        .await
        .unwrap();
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
    }

    #[tokio::test]
    async fn classifies_all_four_kinds() {
        let tmp = TempDir::new().unwrap();
        let meta = store(&tmp).await;
        record(&meta, "same", &fingerprint(b"1"), &[]).await;
        record(&meta, "edited", &fingerprint(b"2"), &[]).await;
        record(&meta, "gone", &fingerprint(b"3"), &[]).await;
        record(&meta, "memory://notes", &fingerprint(b"4"), &[]).await;

        let reader = MapReader(HashMap::from([
            ("same".to_string(), b"1".to_vec()),
            ("edited".to_string(), b"2!".to_vec()),
            ("fresh".to_string(), b"5".to_vec()),
        ]));
        let diff = meta
            .diff(&set(&["same", "edited", "fresh", "broken"]), &reader, "mini", 4)
            .await
            .unwrap();

        assert_eq!(diff.new, set(&["fresh"]));
        assert_eq!(diff.changed, set(&["edited"]));
        assert_eq!(diff.unchanged, set(&["same"]));
        assert_eq!(diff.deleted, set(&["gone"]));
        assert_eq!(diff.unreadable.len(), 1);
        assert_eq!(diff.unreadable[0].0, "broken");
    }

    #[tokio::test]
    async fn other_embedding_model_or_width_counts_as_changed() {
        let tmp = TempDir::new().unwrap();
        let meta = store(&tmp).await;
        record(&meta, "doc", &fingerprint(b"1"), &[]).await;
        let reader = MapReader(HashMap::from([("doc".to_string(), b"1".to_vec())]));

        let same = meta.diff(&set(&["doc"]), &reader, "mini", 4).await.unwrap();
        assert_eq!(same.unchanged, set(&["doc"]));

        let wider = meta.diff(&set(&["doc"]), &reader, "mini", 8).await.unwrap();
        assert_eq!(wider.changed, set(&["doc"]));

        let renamed = meta.diff(&set(&["doc"]), &reader, "large", 4).await.unwrap();
        assert_eq!(renamed.changed, set(&["doc"]));

        let unknown_width = meta.diff(&set(&["doc"]), &reader, "mini", 0).await.unwrap();
        assert_eq!(unknown_width.unchanged, set(&["doc"]));
    }

    #[tokio::test]
    async fn commit_overwrites_and_remove_deletes() {
        let tmp = TempDir::new().unwrap();
        let meta = store(&tmp).await;
        record(&meta, "a", "f1", &["x".to_string()]).await;
        record(&meta, "a", "f2", &["y".to_string(), "z".to_string()]).await;

        let rec = meta.get("a").await.unwrap().unwrap();
        assert_eq!(rec.content_fingerprint, "f2");
        assert_eq!(rec.chunk_ids, vec!["y", "z"]);
        assert_eq!(rec.embedding_model, "mini");
        assert_eq!(rec.embedding_dims, 4);
        assert_eq!(meta.list().await.unwrap().len(), 1);

        meta.remove("a").await.unwrap();
        assert!(meta.get("a").await.unwrap().is_none());
    }
}
