//! Incremental indexing.
//!
//! [`Indexer::update`] brings the vector store in line with a set of input
//! paths:
//!
//! ```text
//! expand inputs → diff → delete removed sources
//!                      → for each new/changed file (concurrently):
//!                          read → extract → chunk → embed → replace → commit
//! ```
//!
//! Each file is all-or-nothing: the chunk swap and the record are written as
//! one change, and any failure leaves the previous record and chunks in place
//! and reports the path in [`IndexReport::failed`]. Work for the same path is
//! serialized by a per-path async lock, so commits for one file never
//! interleave. A directory the walk could not fully read keeps its recorded
//! sources; nothing under it is treated as deleted.

use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, Config};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::extract::extract_text;
use crate::metadata::{fingerprint, MetadataStore, SourceEntry, MEMORY_SCHEME};
use crate::models::{Chunk, IndexReport, ScratchSummary};
use crate::reader::FileReader;
use crate::store::VectorStore;

pub struct Indexer {
    metadata: Arc<MetadataStore>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    reader: Arc<dyn FileReader>,
    chunking: ChunkingConfig,
    batch_size: usize,
    concurrency: usize,
    embedding_timeout: Duration,
    path_locks: PathLocks,
}

impl Indexer {
    pub fn new(
        config: &Config,
        metadata: Arc<MetadataStore>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        reader: Arc<dyn FileReader>,
    ) -> Self {
        Self {
            metadata,
            store,
            embedder,
            reader,
            chunking: config.chunking.clone(),
            batch_size: config.embedding.batch_size.max(1),
            concurrency: config.indexing.concurrency.max(1),
            embedding_timeout: config.timeouts.embedding(),
            path_locks: PathLocks::default(),
        }
    }

    /// Synchronize the index with `inputs` (files or directories).
    ///
    /// Returns `Err` only when the metadata itself cannot be read; per-file
    /// problems are collected in the report.
    pub async fn update(&self, inputs: &[String]) -> Result<IndexReport> {
        let mut report = IndexReport::default();

        let mut candidates = BTreeSet::new();
        let mut incomplete: Vec<String> = Vec::new();
        let mut input_failed = false;
        for input in inputs {
            match self.reader.list(input).await {
                Ok(listing) => {
                    candidates.extend(listing.files);
                    for (path, reason) in listing.errors {
                        incomplete.push(path.clone());
                        report.failed.push((path, reason));
                    }
                }
                Err(e) => {
                    input_failed = true;
                    report.failed.push((input.clone(), e.to_string()));
                }
            }
        }

        let mut diff = self
            .metadata
            .diff(
                &candidates,
                self.reader.as_ref(),
                self.embedder.model_name(),
                self.embedder.dims(),
            )
            .await?;
        if input_failed {
            // An input that could not be listed at all may hold any recorded path.
            if !diff.deleted.is_empty() {
                warn!(kept = diff.deleted.len(), "input listing failed; keeping recorded sources");
            }
            diff.deleted.clear();
        } else if !incomplete.is_empty() {
            diff.deleted
                .retain(|path| !incomplete.iter().any(|dir| Path::new(path).starts_with(dir)));
        }
        info!(
            new = diff.new.len(),
            changed = diff.changed.len(),
            deleted = diff.deleted.len(),
            unchanged = diff.unchanged.len(),
            "computed file diff"
        );
        report.unchanged = diff.unchanged.len();
        report.failed.extend(diff.unreadable.iter().cloned());

        for path in &diff.deleted {
            match self.remove_source(path).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!(path = %path, error = %e, "failed to remove source");
                    report.failed.push((path.clone(), e.to_string()));
                }
            }
        }

        let outcomes: Vec<(String, Result<usize>)> = stream::iter(diff.to_index().cloned())
            .map(|path| async move {
                let outcome = self.index_file(&path).await;
                (path, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (path, outcome) in outcomes {
            match outcome {
                Ok(_) => report.updated += 1,
                Err(e) => {
                    warn!(path = %path, error = %e, "failed to index file");
                    report.failed.push((path, e.to_string()));
                }
            }
        }
        report.failed.sort();

        info!(
            updated = report.updated,
            removed = report.removed,
            unchanged = report.unchanged,
            failed = report.failed.len(),
            "index update complete"
        );
        Ok(report)
    }

    /// Index inline text under `memory://<source>`, replacing any earlier
    /// text stored under the same source. Returns the chunk count.
    pub async fn index_text(&self, source: &str, text: &str) -> Result<usize> {
        let source = source.trim();
        if source.is_empty() {
            return Err(RagError::InvalidInput("source must not be empty".to_string()));
        }
        let path = format!("{}{}", MEMORY_SCHEME, source);
        let lease = self.path_locks.acquire(&path);
        let _guard = lease.lock().await;

        let fp = fingerprint(text.as_bytes());
        self.write_chunks(&path, &fp, text).await
    }

    /// Read, extract, chunk and embed every file under `inputs` without
    /// touching the stores or their records.
    pub async fn embed_files(&self, inputs: &[String]) -> (Vec<Chunk>, ScratchSummary) {
        let mut summary = ScratchSummary::default();
        let mut paths = BTreeSet::new();
        for input in inputs {
            match self.reader.list(input).await {
                Ok(listing) => {
                    paths.extend(listing.files);
                    summary.failed.extend(listing.errors);
                }
                Err(e) => summary.failed.push((input.clone(), e.to_string())),
            }
        }

        let loaded: Vec<(String, Result<Vec<Chunk>>)> = stream::iter(paths)
            .map(|path| async move {
                let outcome = self.load_file(&path).await;
                (path, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut chunks = Vec::new();
        for (path, outcome) in loaded {
            match outcome {
                Ok(file_chunks) => {
                    summary.files += 1;
                    chunks.extend(file_chunks);
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "failed to load file");
                    summary.failed.push((path, e.to_string()));
                }
            }
        }
        chunks.sort_by(|a, b| a.id.cmp(&b.id));
        summary.chunks = chunks.len();
        summary.failed.sort();
        (chunks, summary)
    }

    async fn load_file(&self, path: &str) -> Result<Vec<Chunk>> {
        let bytes = self.reader.read(path).await?;
        let text = self.extract(path, bytes).await?;
        self.embedded_chunks(path, &text).await
    }

    async fn index_file(&self, path: &str) -> Result<usize> {
        let lease = self.path_locks.acquire(path);
        let _guard = lease.lock().await;

        let bytes = self.reader.read(path).await?;
        // Fingerprint what is actually indexed, even if the file changed since diff.
        let fp = fingerprint(&bytes);
        let text = self.extract(path, bytes).await?;

        self.write_chunks(path, &fp, &text).await
    }

    async fn extract(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        let unreadable = |reason: String| RagError::FileUnreadable {
            path: path.to_string(),
            reason,
        };
        let owned_path = path.to_string();
        tokio::task::spawn_blocking(move || extract_text(&owned_path, &bytes))
            .await
            .map_err(|e| unreadable(e.to_string()))?
            .map_err(|e| unreadable(e.to_string()))
    }

    async fn embedded_chunks(&self, path: &str, text: &str) -> Result<Vec<Chunk>> {
        let mut chunks = chunk_text(
            path,
            text,
            self.chunking.chunk_size,
            self.chunking.chunk_overlap,
        );
        self.embed_chunks(&mut chunks).await?;
        Ok(chunks)
    }

    /// Chunk, embed, swap the stored vectors and commit the record. Caller holds the path lock.
    async fn write_chunks(&self, path: &str, fp: &str, text: &str) -> Result<usize> {
        let chunks = self.embedded_chunks(path, text).await?;

        let new_ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let keep: HashSet<&String> = new_ids.iter().collect();
        let stale: Vec<String> = match self.metadata.get(path).await? {
            Some(prior) => prior
                .chunk_ids
                .into_iter()
                .filter(|id| !keep.contains(id))
                .collect(),
            None => Vec::new(),
        };

        let entry = SourceEntry {
            path,
            fingerprint: fp,
            chunk_ids: &new_ids,
            embedding_model: self.embedder.model_name(),
            embedding_dims: chunks
                .first()
                .map(|c| c.embedding.len())
                .unwrap_or_else(|| self.embedder.dims()),
        };
        self.store
            .replace_recorded(&stale, &chunks, &self.metadata, &entry)
            .await?;

        info!(path = %path, chunks = chunks.len(), stale = stale.len(), "indexed source");
        Ok(chunks.len())
    }

    async fn embed_chunks(&self, chunks: &mut [Chunk]) -> Result<()> {
        for batch in chunks.chunks_mut(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = tokio::time::timeout(self.embedding_timeout, self.embedder.embed(&texts))
                .await
                .map_err(|_| RagError::EmbeddingFailed("embedding timed out".to_string()))?
                .map_err(|e| RagError::EmbeddingFailed(format!("{:#}", e)))?;

            if vectors.len() != batch.len() {
                return Err(RagError::EmbeddingFailed(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            let dims = self.embedder.dims();
            for (chunk, vector) in batch.iter_mut().zip(vectors) {
                if vector.is_empty() || (dims > 0 && vector.len() != dims) {
                    return Err(RagError::EmbeddingFailed(format!(
                        "vector has {} dimensions, expected {}",
                        vector.len(),
                        dims
                    )));
                }
                chunk.embedding = vector;
            }
            debug!(batch = batch.len(), "embedded chunk batch");
        }
        Ok(())
    }

    async fn remove_source(&self, path: &str) -> Result<()> {
        let lease = self.path_locks.acquire(path);
        let _guard = lease.lock().await;

        if let Some(record) = self.metadata.get(path).await? {
            self.store.delete(&record.chunk_ids).await?;
        }
        self.metadata.remove(path).await?;
        info!(path = %path, "removed source");
        Ok(())
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        self.path_locks.len()
    }
}

/// One async mutex per path, dropped once no task holds or waits on it.
#[derive(Default)]
struct PathLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PathLocks {
    fn acquire(&self, path: &str) -> PathLease<'_> {
        let mut locks = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let lock = locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        PathLease {
            locks: self,
            path: path.to_string(),
            lock,
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

struct PathLease<'a> {
    locks: &'a PathLocks,
    path: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl PathLease<'_> {
    async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for PathLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.inner.lock().unwrap_or_else(|p| p.into_inner());
        // Clones are only made under `inner`, so two owners means the map and us.
        if locks
            .get(&self.path)
            .is_some_and(|l| Arc::ptr_eq(l, &self.lock) && Arc::strong_count(l) == 2)
        {
            locks.remove(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn leases_share_one_lock_per_path_and_are_pruned() {
        let locks = PathLocks::default();
        let first = locks.acquire("a.txt");
        let second = locks.acquire("a.txt");
        let other = locks.acquire("b.txt");
        assert!(Arc::ptr_eq(&first.lock, &second.lock));
        assert_eq!(locks.len(), 2);

        let guard = first.lock().await;
        assert!(second.lock.try_lock().is_err());
        drop(guard);

        drop(first);
        assert_eq!(locks.len(), 2);
        drop(second);
        drop(other);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn indexing_many_sources_leaves_no_locks_behind() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = Config::with_db_path(tmp.path().join("rag.sqlite"));
        let pool = crate::db::connect(&config.db.path).await.unwrap();
        crate::migrate::migrate(&pool).await.unwrap();
        let indexer = Indexer::new(
            &config,
            Arc::new(MetadataStore::new(pool.clone())),
            Arc::new(crate::store::SqliteVectorStore::new(pool)),
            Arc::new(crate::embedding::HashingEmbedder::new(32)),
            Arc::new(crate::reader::FsReader::new(&config.files).unwrap()),
        );

        for i in 0..20 {
            indexer
                .index_text(&format!("note-{}", i), "lorem ipsum dolor")
                .await
                .unwrap();
        }
        assert_eq!(indexer.held_locks(), 0);
    }
}
