//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait is the only way the indexer writes chunks and
//! the retriever reads them. Two backends ship with the crate:
//!
//! | Backend | Module | Persistence |
//! |---------|--------|-------------|
//! | [`SqliteVectorStore`] | [`sqlite`] | `chunk_vectors` table under `db.path` |
//! | [`InMemoryVectorStore`] | [`memory`] | none (tests, scratch knowledge bases) |
//!
//! Both score by brute-force cosine similarity; neither is an ANN index.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::warn;

use crate::error::Result;
use crate::metadata::{MetadataStore, SourceEntry};
use crate::models::Chunk;

pub use memory::InMemoryVectorStore;
pub use sqlite::SqliteVectorStore;

/// A stored chunk together with its similarity to a query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Abstract vector backend.
///
/// Chunks passed to [`upsert`](VectorStore::upsert) and
/// [`replace`](VectorStore::replace) carry their embedding.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert chunks, overwriting any with the same id.
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()>;

    /// Remove chunks by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// At most `k` chunks, best first.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Remove `remove_ids` and upsert `upserts` as one atomic change:
    /// concurrent readers observe either the old or the new set, never a mix.
    async fn replace(&self, remove_ids: &[String], upserts: &[Chunk]) -> Result<()>;

    /// Number of stored chunks.
    async fn count(&self) -> Result<usize>;

    /// Stored chunks among `ids`. Unknown ids are skipped.
    async fn get(&self, ids: &[String]) -> Result<Vec<Chunk>>;

    /// [`replace`](VectorStore::replace) one source's chunks and record
    /// `entry` in `metadata` as a single change.
    ///
    /// When the record cannot be written the swap is undone, so no chunk is
    /// left without a record pointing at it. Readers may briefly see the new
    /// chunks before the undo; backends living in the metadata database
    /// override this with one transaction.
    async fn replace_recorded(
        &self,
        remove_ids: &[String],
        upserts: &[Chunk],
        metadata: &MetadataStore,
        entry: &SourceEntry<'_>,
    ) -> Result<()> {
        let mut touched: Vec<String> = remove_ids.to_vec();
        touched.extend(upserts.iter().map(|c| c.id.clone()));
        let previous = self.get(&touched).await?;

        self.replace(remove_ids, upserts).await?;
        if let Err(e) = metadata.commit(entry).await {
            let existed: HashSet<&str> = previous.iter().map(|c| c.id.as_str()).collect();
            let added: Vec<String> = upserts
                .iter()
                .filter(|c| !existed.contains(c.id.as_str()))
                .map(|c| c.id.clone())
                .collect();
            if let Err(undo) = self.replace(&added, &previous).await {
                warn!(path = %entry.path, error = %undo, "failed to restore chunks after record write failed");
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Sort by descending score, ties broken by id so results are deterministic.
pub(crate) fn rank_scored(mut scored: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    scored.truncate(k);
    scored
}
