//! Error taxonomy for indexing and the retrieval pipeline.
//!
//! Library components return [`RagError`]. Pipeline-level failures are
//! wrapped in [`PipelineError`], which records the stage the orchestrator
//! had reached when the failure (or cancellation) was observed.

use thiserror::Error;

use crate::pipeline::Stage;

/// Errors produced by the knowledge-base components.
#[derive(Debug, Error)]
pub enum RagError {
    /// The persistence layer (metadata or vector store) could not be read or written.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The vector search (or the query embedding that feeds it) failed or timed out.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// The language model could not produce a usable reformulated query.
    #[error("query rewrite failed: {0}")]
    RewriteFailed(String),

    /// The language model failed to produce the final answer.
    #[error("answer generation failed: {0}")]
    GenerationFailed(String),

    /// An external cancellation signal was observed.
    #[error("cancelled")]
    Cancelled,

    /// Embedding a file's chunks failed or returned a malformed batch.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    /// A source file could not be read or decoded.
    #[error("cannot read {path}: {reason}")]
    FileUnreadable { path: String, reason: String },

    /// The caller supplied an argument the operation cannot accept.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The operation needs state that does not exist yet.
    #[error("not found: {0}")]
    NotFound(String),

    /// Configuration rejected at load or construction time.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RagError {
    /// Short machine-readable code, used by the tool server error body.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::StoreUnavailable(_) => "store_unavailable",
            RagError::RetrievalUnavailable(_) => "retrieval_unavailable",
            RagError::RewriteFailed(_) => "rewrite_failed",
            RagError::GenerationFailed(_) => "generation_failed",
            RagError::Cancelled => "cancelled",
            RagError::EmbeddingFailed(_) => "embedding_failed",
            RagError::FileUnreadable { .. } => "file_unreadable",
            RagError::InvalidInput(_) => "bad_request",
            RagError::NotFound(_) => "not_found",
            RagError::Config(_) => "config",
        }
    }
}

impl From<sqlx::Error> for RagError {
    fn from(e: sqlx::Error) -> Self {
        RagError::StoreUnavailable(e.to_string())
    }
}

/// A convenience result type for knowledge-base operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Terminal failure of one `rag_answer` pipeline run.
#[derive(Debug, Error)]
#[error("pipeline failed at {stage}: {source}")]
pub struct PipelineError {
    /// Last stage the orchestrator entered.
    pub stage: Stage,
    /// Underlying cause.
    #[source]
    pub source: RagError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: RagError) -> Self {
        Self { stage, source }
    }

    /// True when the run was aborted by the caller rather than by a system error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, RagError::Cancelled)
    }
}
