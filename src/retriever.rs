//! Top-K retrieval: embed the query, search the vector store, rank.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::embedding::{embed_query, Embedder};
use crate::error::{RagError, Result};
use crate::models::RetrievalResult;
use crate::store::VectorStore;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    embedding_timeout: Duration,
    search_timeout: Duration,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        embedding_timeout: Duration,
        search_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            store,
            embedding_timeout,
            search_timeout,
        }
    }

    /// At most `k` results in descending score order, ranked from 0.
    ///
    /// Embedding or search failures and timeouts all surface as
    /// [`RagError::RetrievalUnavailable`]; no retry happens here.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        if k == 0 {
            return Err(RagError::InvalidInput("k must be greater than 0".to_string()));
        }
        if query.trim().is_empty() {
            return Err(RagError::InvalidInput("query must not be empty".to_string()));
        }

        let vector = tokio::time::timeout(
            self.embedding_timeout,
            embed_query(self.embedder.as_ref(), query),
        )
        .await
        .map_err(|_| RagError::RetrievalUnavailable("query embedding timed out".to_string()))?
        .map_err(|e| RagError::RetrievalUnavailable(format!("query embedding failed: {:#}", e)))?;

        let mut hits = tokio::time::timeout(self.search_timeout, self.store.search(&vector, k))
            .await
            .map_err(|_| RagError::RetrievalUnavailable("vector search timed out".to_string()))?
            .map_err(|e| RagError::RetrievalUnavailable(e.to_string()))?;

        // Backends already sort; re-sort so the ranking holds for any store.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        debug!(k, hits = hits.len(), "retrieved");

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(rank, hit)| RetrievalResult {
                chunk: hit.chunk,
                score: hit.score,
                rank,
            })
            .collect())
    }
}
