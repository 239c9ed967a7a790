//! TOML configuration.
//!
//! Every recognized option is a field of [`Config`]; unknown keys are
//! rejected when the file is parsed, and value ranges are checked by
//! [`Config::validate`] before anything is opened.
//!
//! ```toml
//! [db]
//! path = "./data/rag.sqlite"
//!
//! [chunking]
//! chunk_size = 2000
//! chunk_overlap = 200
//!
//! [retrieval]
//! top_k = 4
//! relevance_threshold = 0.3
//! min_supporting_results = 1
//! max_rewrites = 1
//!
//! [timeouts]
//! embedding_secs = 30
//! search_secs = 10
//! generation_secs = 60
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Splitting granularity, in characters.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 200,
        }
    }
}

/// Retrieval breadth and the relevance / rewrite policy.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct RetrievalConfig {
    /// Default number of chunks fetched per retrieval.
    pub top_k: usize,
    /// Minimum cosine similarity the top result must reach.
    pub relevance_threshold: f32,
    /// Results (top one included) that must lie within `support_margin` of the top score.
    pub min_supporting_results: usize,
    /// Score distance from the top result that still counts as corroboration.
    pub support_margin: f32,
    /// Upper bound on REWRITE iterations per query.
    pub max_rewrites: u32,
    /// Extra attempts the orchestrator makes after a failed retrieval (0 or 1).
    pub retrieval_retries: u32,
    /// Upper bound on the context block handed to the language model.
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            relevance_threshold: 0.3,
            min_supporting_results: 1,
            support_margin: 0.1,
            max_rewrites: 1,
            retrieval_retries: 0,
            max_context_chars: 12_000,
        }
    }
}

/// Per-call deadlines for each class of external call.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct TimeoutConfig {
    pub embedding_secs: u64,
    pub search_secs: u64,
    pub generation_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            embedding_secs: 30,
            search_secs: 10,
            generation_secs: 60,
        }
    }
}

impl TimeoutConfig {
    pub fn embedding(&self) -> Duration {
        Duration::from_secs(self.embedding_secs)
    }
    pub fn search(&self) -> Duration {
        Duration::from_secs(self.search_secs)
    }
    pub fn generation(&self) -> Duration {
        Duration::from_secs(self.generation_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct EmbeddingConfig {
    /// `disabled`, `openai`, `ollama`, `hashing` or `local`.
    pub provider: String,
    pub model: Option<String>,
    pub dims: Option<usize>,
    /// Base URL override (OpenAI-compatible gateways, Ollama host).
    pub url: Option<String>,
    pub batch_size: usize,
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct LlmConfig {
    /// `disabled`, `openai` or `ollama`.
    pub provider: String,
    pub model: Option<String>,
    pub url: Option<String>,
    pub temperature: f32,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: None,
            temperature: 0.0,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct IndexingConfig {
    /// Files processed concurrently by one `update` call.
    pub concurrency: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// Directory expansion rules. Explicitly named files bypass the globs.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct FilesConfig {
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub follow_symlinks: bool,
    pub max_file_bytes: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            include_globs: [
                "**/*.md", "**/*.txt", "**/*.rst", "**/*.html", "**/*.htm", "**/*.py",
                "**/*.rs", "**/*.c", "**/*.cpp", "**/*.h", "**/*.hpp", "**/*.json",
                "**/*.toml", "**/*.yaml", "**/*.yml", "**/*.pdf", "**/*.docx",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            max_file_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7341".to_string(),
        }
    }
}

impl Config {
    /// A configuration with every section at its default, storing data at `db_path`.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            timeouts: TimeoutConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            indexing: IndexingConfig::default(),
            files: FilesConfig::default(),
            server: ServerConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if c.chunk_overlap >= c.chunk_size {
            bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
        }

        let r = &self.retrieval;
        if r.top_k == 0 {
            bail!("retrieval.top_k must be >= 1");
        }
        if !(-1.0..=1.0).contains(&r.relevance_threshold) {
            bail!("retrieval.relevance_threshold must be in [-1.0, 1.0] (cosine similarity)");
        }
        if r.min_supporting_results == 0 {
            bail!("retrieval.min_supporting_results must be >= 1");
        }
        if r.min_supporting_results > r.top_k {
            bail!("retrieval.min_supporting_results cannot exceed retrieval.top_k");
        }
        if !(0.0..=2.0).contains(&r.support_margin) {
            bail!("retrieval.support_margin must be in [0.0, 2.0]");
        }
        if r.retrieval_retries > 1 {
            bail!("retrieval.retrieval_retries must be 0 or 1");
        }
        if r.max_context_chars == 0 {
            bail!("retrieval.max_context_chars must be > 0");
        }

        let t = &self.timeouts;
        if t.embedding_secs == 0 || t.search_secs == 0 || t.generation_secs == 0 {
            bail!("timeouts must be > 0 seconds");
        }

        if self.indexing.concurrency == 0 {
            bail!("indexing.concurrency must be >= 1");
        }

        let e = &self.embedding;
        if e.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        match e.provider.as_str() {
            "disabled" | "local" => {}
            "openai" | "ollama" => {
                if e.model.is_none() {
                    bail!("embedding.model must be specified when provider is '{}'", e.provider);
                }
                if e.dims.is_none() || e.dims == Some(0) {
                    bail!("embedding.dims must be > 0 when provider is '{}'", e.provider);
                }
            }
            "hashing" => {
                if e.dims == Some(0) {
                    bail!("embedding.dims must be > 0");
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, hashing, or local.",
                other
            ),
        }

        match self.llm.provider.as_str() {
            "disabled" => {}
            "openai" | "ollama" => {
                if self.llm.model.is_none() {
                    bail!("llm.model must be specified when provider is '{}'", self.llm.provider);
                }
            }
            other => bail!(
                "Unknown llm provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse_config("[db]\npath = \"/tmp/x.sqlite\"\n").unwrap();
        assert_eq!(cfg.retrieval.top_k, 4);
        assert_eq!(cfg.retrieval.max_rewrites, 1);
        assert_eq!(cfg.retrieval.min_supporting_results, 1);
        assert_eq!(cfg.chunking.chunk_size, 2000);
        assert!(!cfg.embedding.is_enabled());
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = parse_config("[db]\npath = \"x\"\n\n[retrieval]\ntop_kk = 3\n").unwrap_err();
        assert!(format!("{:#}", err).contains("top_kk"));
    }

    #[test]
    fn unknown_section_is_rejected() {
        assert!(parse_config("[db]\npath = \"x\"\n\n[vectors]\nfoo = 1\n").is_err());
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let err =
            parse_config("[db]\npath = \"x\"\n\n[chunking]\nchunk_size = 10\nchunk_overlap = 10\n")
                .unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn retrieval_retries_bounded() {
        assert!(parse_config("[db]\npath = \"x\"\n\n[retrieval]\nretrieval_retries = 2\n").is_err());
    }

    #[test]
    fn openai_embedding_requires_model_and_dims() {
        let err = parse_config("[db]\npath = \"x\"\n\n[embedding]\nprovider = \"openai\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn example_config_parses() {
        let cfg = parse_config(include_str!("../config/rag.example.toml")).unwrap();
        assert_eq!(cfg.embedding.provider, "openai");
        assert_eq!(cfg.retrieval.support_margin, 0.1);
        assert_eq!(cfg.files.exclude_globs, vec!["**/drafts/**"]);
    }

    #[test]
    fn unknown_llm_provider_rejected() {
        assert!(parse_config("[db]\npath = \"x\"\n\n[llm]\nprovider = \"magic\"\n").is_err());
    }
}
