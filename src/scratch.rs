//! Session-scoped temporary knowledge base.
//!
//! A [`ScratchIndex`] holds at most one throwaway index, built from a path
//! list into an [`InMemoryVectorStore`] and searched like the main one.
//! Nothing is written to the database. Building a new index replaces the
//! previous one only once every chunk is embedded and stored; the index
//! disappears with the [`KnowledgeBase`](crate::knowledge::KnowledgeBase)
//! that owns it.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::models::{Chunk, RetrievalResult, ScratchSummary};
use crate::retriever::Retriever;
use crate::store::{InMemoryVectorStore, VectorStore};

struct Scratch {
    retriever: Retriever,
    summary: ScratchSummary,
}

pub struct ScratchIndex {
    embedder: Arc<dyn Embedder>,
    config: Config,
    current: RwLock<Option<Scratch>>,
}

impl ScratchIndex {
    pub fn new(config: &Config, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            config: config.clone(),
            current: RwLock::new(None),
        }
    }

    /// Store `chunks` in a fresh index and make it the current one.
    pub async fn install(&self, chunks: Vec<Chunk>, summary: ScratchSummary) -> Result<ScratchSummary> {
        let store = Arc::new(InMemoryVectorStore::new());
        store.upsert(&chunks).await?;
        let retriever = Retriever::new(
            self.embedder.clone(),
            store,
            self.config.timeouts.embedding(),
            self.config.timeouts.search(),
        );

        info!(files = summary.files, chunks = summary.chunks, "temporary knowledge base ready");
        *self.current.write().await = Some(Scratch {
            retriever,
            summary: summary.clone(),
        });
        Ok(summary)
    }

    pub async fn search(&self, query: &str, k: Option<usize>) -> Result<Vec<RetrievalResult>> {
        let current = self.current.read().await;
        let scratch = current.as_ref().ok_or_else(|| {
            RagError::NotFound(
                "no temporary knowledge base exists; create one with create_temp_knowledge_base"
                    .to_string(),
            )
        })?;
        scratch
            .retriever
            .retrieve(query, k.unwrap_or(self.config.retrieval.top_k))
            .await
    }

    pub async fn summary(&self) -> Option<ScratchSummary> {
        self.current.read().await.as_ref().map(|s| s.summary.clone())
    }

    pub async fn clear(&self) {
        *self.current.write().await = None;
    }
}
