//! Core data models used throughout the knowledge base.
//!
//! These types flow between the indexer, the stores, and the retrieval
//! pipeline. Only [`SourceRecord`] and [`Chunk`] are persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

/// Indexing state of one source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRecord {
    pub path: String,
    /// SHA-256 (hex) of the file bytes at the time of indexing.
    pub content_fingerprint: String,
    /// Chunk ids currently stored for this path, in file order.
    pub chunk_ids: Vec<String>,
    /// Embedding model and vector width the chunks were produced with.
    pub embedding_model: String,
    pub embedding_dims: usize,
    pub indexed_at: DateTime<Utc>,
}

/// A bounded span of a source file, embedded and stored as one unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: String,
    pub source_path: String,
    pub chunk_index: i64,
    pub text: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

/// One ranked hit from a retrieval call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    /// Cosine similarity; higher is more relevant.
    pub score: f32,
    /// Position in the result list, starting at 0 for the best hit.
    pub rank: usize,
}

/// Working state of a single `rag_answer` run. Owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct QueryState {
    pub original_query: String,
    pub current_query: String,
    pub rewrite_count: u32,
    pub retrieved: Vec<RetrievalResult>,
}

impl QueryState {
    pub fn new(query: &str) -> Self {
        Self {
            original_query: query.to_string(),
            current_query: query.to_string(),
            rewrite_count: 0,
            retrieved: Vec::new(),
        }
    }
}

/// Classification of candidate paths against the stored records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileDiff {
    pub new: BTreeSet<String>,
    pub changed: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
    /// Candidates whose content could not be read, with the reason.
    pub unreadable: Vec<(String, String)>,
}

impl FileDiff {
    /// Paths that need (re-)embedding, new first, each group in path order.
    pub fn to_index(&self) -> impl Iterator<Item = &String> {
        self.new.iter().chain(self.changed.iter())
    }
}

/// Outcome of one `update` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexReport {
    /// New or changed files successfully re-indexed.
    pub updated: usize,
    /// Files whose records and chunks were removed.
    pub removed: usize,
    /// Files left untouched because their fingerprint matched.
    pub unchanged: usize,
    pub failed: Vec<(String, String)>,
}

/// Outcome of building a temporary knowledge base.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScratchSummary {
    /// Files read, extracted and embedded.
    pub files: usize,
    pub chunks: usize,
    pub failed: Vec<(String, String)>,
}

/// Relevance judgement over a retrieval result list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub sufficient: bool,
    pub best_score: Option<f32>,
}

/// Final answer produced by the composer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// Distinct source paths whose text was placed in the prompt, in order of first appearance.
    pub sources: Vec<String>,
    pub grounded: bool,
}

/// Tool-facing shape of one search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub text: String,
    pub source_path: String,
    pub score: f32,
}

impl From<RetrievalResult> for SearchHit {
    fn from(r: RetrievalResult) -> Self {
        Self {
            text: r.chunk.text,
            source_path: r.chunk.source_path,
            score: r.score,
        }
    }
}
