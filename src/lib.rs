//! # RAG Harness
//!
//! A retrieval-augmented generation subsystem for agents: a persistent,
//! incrementally maintained vector index over a file corpus, and a bounded
//! retrieve → score → rewrite → compose pipeline that answers questions from
//! that index.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────────┐
//! │ FileReader  │──▶│   Indexer    │──▶│ SQLite          │
//! │ files/dirs  │   │ chunk+embed  │   │ sources+vectors │
//! └─────────────┘   └──────────────┘   └────────┬────────┘
//!                                               │
//!        ┌──────────────────────────────────────┘
//!        ▼
//! ┌────────────┐   ┌────────┐   ┌──────────┐   ┌──────────┐
//! │ Retriever  │──▶│ Scorer │──▶│ Rewriter │   │ Composer │──▶ Answer
//! └────────────┘   └────────┘   └──────────┘   └──────────┘
//!                   (bounded state machine in `pipeline`)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag init
//! rag update "docs/; notes/todo.md"
//! rag search "retry policy"
//! rag answer "how are timeouts configured?"
//! rag serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`chunk`] | Text chunking |
//! | [`extract`] | PDF / DOCX / HTML text extraction |
//! | [`reader`] | File access and directory expansion |
//! | [`embedding`] | Embedding providers and vector helpers |
//! | [`llm`] | Language-model providers |
//! | [`store`] | Vector stores (SQLite, in-memory) |
//! | [`metadata`] | Per-source fingerprints and change detection |
//! | [`indexer`] | Incremental indexing |
//! | [`retriever`] | Top-K retrieval |
//! | [`scorer`] | Relevance verdicts |
//! | [`rewriter`] | Query reformulation |
//! | [`composer`] | Grounded answer composition |
//! | [`pipeline`] | Answer state machine |
//! | [`knowledge`] | Knowledge base lifecycle and operations |
//! | [`scratch`] | Session-scoped temporary knowledge base |
//! | [`tools`] | Tool trait and registry |
//! | [`server`] | HTTP tool server |
//! | [`sources`] | Indexed-source listing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod composer;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
mod http;
pub mod indexer;
pub mod knowledge;
pub mod llm;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod reader;
pub mod retriever;
pub mod rewriter;
pub mod scorer;
pub mod scratch;
pub mod server;
pub mod sources;
pub mod store;
pub mod tools;
