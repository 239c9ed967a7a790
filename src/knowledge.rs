//! The knowledge base: an explicitly opened resource owning the stores,
//! the indexer and the answer pipeline.
//!
//! ```rust,no_run
//! use rag_harness::config::Config;
//! use rag_harness::knowledge::KnowledgeBase;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let kb = KnowledgeBase::open(Config::with_db_path("./data/rag.sqlite")).await?;
//! kb.update_knowledge_base_from_files("docs/; README.md").await?;
//! let hits = kb.search_knowledge_base("how do I configure timeouts", None).await?;
//! kb.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! Any number of knowledge bases can be open at once, one per database file.

use anyhow::Context;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::composer::AnswerComposer;
use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{PipelineError, RagError, Result};
use crate::indexer::Indexer;
use crate::llm::{create_language_model, LanguageModel};
use crate::metadata::MetadataStore;
use crate::migrate;
use crate::models::{Answer, IndexReport, ScratchSummary, SearchHit, SourceRecord};
use crate::pipeline::{CancellationFlag, Orchestrator, PipelineRun};
use crate::reader::{split_path_list, FileReader, FsReader};
use crate::retriever::Retriever;
use crate::rewriter::QueryRewriter;
use crate::scratch::ScratchIndex;
use crate::store::{SqliteVectorStore, VectorStore};

/// Collaborators a knowledge base is assembled from.
///
/// [`Components::from_config`] builds the configured providers; tests swap
/// in doubles. With `store` unset the SQLite vector store under `db.path`
/// is used.
pub struct Components {
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LanguageModel>,
    pub reader: Arc<dyn FileReader>,
    pub store: Option<Arc<dyn VectorStore>>,
}

impl Components {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            embedder: create_embedder(&config.embedding, &config.timeouts)?,
            llm: create_language_model(&config.llm, &config.timeouts)?,
            reader: Arc::new(FsReader::new(&config.files)?),
            store: None,
        })
    }
}

pub struct KnowledgeBase {
    config: Config,
    pool: SqlitePool,
    metadata: Arc<MetadataStore>,
    store: Arc<dyn VectorStore>,
    indexer: Indexer,
    retriever: Arc<Retriever>,
    orchestrator: Orchestrator,
    scratch: ScratchIndex,
}

impl KnowledgeBase {
    /// Open the knowledge base described by `config`, creating the database if needed.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let components = Components::from_config(&config)?;
        Self::open_with(config, components).await
    }

    pub async fn open_with(config: Config, components: Components) -> anyhow::Result<Self> {
        config.validate()?;
        let pool = db::connect(&config.db.path).await?;
        migrate::migrate(&pool)
            .await
            .context("Failed to create knowledge base schema")?;

        let metadata = Arc::new(MetadataStore::new(pool.clone()));
        let store: Arc<dyn VectorStore> = match components.store {
            Some(store) => store,
            None => Arc::new(SqliteVectorStore::new(pool.clone())),
        };

        let indexer = Indexer::new(
            &config,
            metadata.clone(),
            store.clone(),
            components.embedder.clone(),
            components.reader,
        );
        let scratch = ScratchIndex::new(&config, components.embedder.clone());
        let retriever = Arc::new(Retriever::new(
            components.embedder,
            store.clone(),
            config.timeouts.embedding(),
            config.timeouts.search(),
        ));
        let orchestrator = Orchestrator::new(
            &config.retrieval,
            retriever.clone(),
            QueryRewriter::new(components.llm.clone(), config.timeouts.generation()),
            AnswerComposer::new(
                components.llm,
                config.timeouts.generation(),
                config.retrieval.max_context_chars,
            ),
        );

        Ok(Self {
            config,
            pool,
            metadata,
            store,
            indexer,
            retriever,
            orchestrator,
            scratch,
        })
    }

    /// Release the database connections.
    pub async fn close(self) {
        self.pool.close().await;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Index or refresh the files and directories in `paths`
    /// (separated by `;`, `,` or newlines).
    ///
    /// The list is the complete corpus: recorded files not named by it
    /// (directly or through a directory) are removed from the index.
    pub async fn update_knowledge_base_from_files(&self, paths: &str) -> Result<IndexReport> {
        self.update(&split_path_list(paths)).await
    }

    pub async fn update(&self, paths: &[String]) -> Result<IndexReport> {
        if paths.is_empty() {
            return Err(RagError::InvalidInput(
                "at least one file or directory path is required".to_string(),
            ));
        }
        self.indexer.update(paths).await
    }

    /// The `k` (default `retrieval.top_k`) most similar chunks.
    pub async fn search_knowledge_base(&self, query: &str, k: Option<usize>) -> Result<Vec<SearchHit>> {
        let k = k.unwrap_or(self.config.retrieval.top_k);
        let results = self.retriever.retrieve(query, k).await?;
        Ok(results.into_iter().map(SearchHit::from).collect())
    }

    pub async fn rag_answer(&self, query: &str) -> std::result::Result<Answer, PipelineError> {
        let run = self.rag_answer_with(query, &CancellationFlag::new()).await?;
        Ok(run.answer)
    }

    /// Like [`rag_answer`](Self::rag_answer), observing `cancel` and returning the whole run.
    pub async fn rag_answer_with(
        &self,
        query: &str,
        cancel: &CancellationFlag,
    ) -> std::result::Result<PipelineRun, PipelineError> {
        self.orchestrator.run(query, cancel).await
    }

    /// Index `content` under `memory://<source>`. Returns the number of chunks stored.
    pub async fn add_to_knowledge_base(&self, content: &str, source: &str) -> Result<usize> {
        if content.trim().is_empty() {
            return Err(RagError::InvalidInput("content must not be empty".to_string()));
        }
        self.indexer.index_text(source, content).await
    }

    /// Build a temporary knowledge base from `paths` for this session,
    /// replacing any earlier one. Nothing is persisted.
    pub async fn create_temp_knowledge_base(&self, paths: &str) -> Result<ScratchSummary> {
        let inputs = split_path_list(paths);
        if inputs.is_empty() {
            return Err(RagError::InvalidInput(
                "at least one file or directory path is required".to_string(),
            ));
        }
        let (chunks, summary) = self.indexer.embed_files(&inputs).await;
        if chunks.is_empty() {
            return Err(RagError::InvalidInput(format!(
                "no documents found or loaded from: {}",
                inputs.join(", ")
            )));
        }
        self.scratch.install(chunks, summary).await
    }

    /// Search the temporary knowledge base. Fails with `not_found` before
    /// [`create_temp_knowledge_base`](Self::create_temp_knowledge_base).
    pub async fn search_temp_knowledge_base(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        let results = self.scratch.search(query, k).await?;
        Ok(results.into_iter().map(SearchHit::from).collect())
    }

    pub async fn list_sources(&self) -> Result<Vec<SourceRecord>> {
        self.metadata.list().await
    }

    pub async fn chunk_count(&self) -> Result<usize> {
        self.store.count().await
    }
}
