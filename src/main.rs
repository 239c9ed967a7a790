//! # RAG Harness CLI (`rag`)
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the SQLite database and schema |
//! | `rag update <paths>...` | Index files/directories; drop recorded files not listed |
//! | `rag add "<text>"` | Index a piece of text under `memory://<source>` |
//! | `rag search "<query>"` | Top-K passages with scores |
//! | `rag answer "<question>"` | Grounded answer with sources |
//! | `rag sources` | List indexed sources |
//! | `rag serve` | Start the HTTP tool server |
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); results go to stdout.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use rag_harness::config;
use rag_harness::knowledge::KnowledgeBase;
use rag_harness::migrate;
use rag_harness::server;
use rag_harness::sources::{print_sources, summarize};

/// RAG Harness: incremental document index and grounded question answering.
///
/// All commands accept a `--config` flag pointing to a TOML configuration file.
#[derive(Parser)]
#[command(name = "rag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Index or refresh files and directories.
    ///
    /// The given paths are the whole corpus: previously indexed files that
    /// are no longer named (directly or via a directory) are removed.
    /// Each argument may itself hold several paths separated by `;` or `,`.
    Update {
        #[arg(required = true)]
        paths: Vec<String>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Add a piece of text to the knowledge base.
    Add {
        content: String,

        /// Label stored as `memory://<source>`.
        #[arg(long, default_value = "user_input")]
        source: String,
    },

    /// Search the knowledge base.
    Search {
        query: String,

        /// Maximum number of results (default: retrieval.top_k).
        #[arg(long)]
        k: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the knowledge base.
    Answer {
        query: String,

        #[arg(long)]
        json: bool,
    },

    /// List indexed sources.
    Sources {
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP tool server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    // No providers needed, so no knowledge base is opened.
    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized at {}", cfg.db.path.display());
        return Ok(());
    }

    let kb = Arc::new(
        KnowledgeBase::open(cfg)
            .await
            .context("Failed to open knowledge base")?,
    );
    let result = run(kb.clone(), cli.command).await;
    if let Ok(kb) = Arc::try_unwrap(kb) {
        kb.close().await;
    }
    result
}

async fn run(kb: Arc<KnowledgeBase>, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init => {}
        Commands::Update { paths, json } => {
            let report = kb.update_knowledge_base_from_files(&paths.join(";")).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "updated: {}, removed: {}, unchanged: {}, failed: {}",
                    report.updated,
                    report.removed,
                    report.unchanged,
                    report.failed.len()
                );
                for (path, reason) in &report.failed {
                    println!("  failed {}: {}", path, reason);
                }
            }
        }
        Commands::Add { content, source } => {
            let chunks = kb.add_to_knowledge_base(&content, &source).await?;
            println!(
                "Added {} chunk(s) to knowledge base (source: memory://{}).",
                chunks,
                source.trim()
            );
        }
        Commands::Search { query, k, json } => {
            let hits = kb.search_knowledge_base(&query, k).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                println!("No relevant information found in knowledge base.");
            } else {
                let blocks: Vec<String> = hits
                    .iter()
                    .map(|h| {
                        format!(
                            "Score: {:.3}\nSource: {}\nContent: {}",
                            h.score, h.source_path, h.text
                        )
                    })
                    .collect();
                println!("{}", blocks.join("\n\n"));
            }
        }
        Commands::Answer { query, json } => {
            let answer = kb.rag_answer(&query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", answer.text);
                if answer.grounded {
                    println!("\nSources:");
                    for s in &answer.sources {
                        println!("- {}", s);
                    }
                }
            }
        }
        Commands::Sources { json } => {
            let sources = summarize(&kb.list_sources().await?);
            if json {
                println!("{}", serde_json::to_string_pretty(&sources)?);
            } else {
                print_sources(&sources);
            }
        }
        Commands::Serve => server::run_server(kb).await?,
    }
    Ok(())
}
