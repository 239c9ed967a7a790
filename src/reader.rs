//! File access behind the [`FileReader`] trait.
//!
//! [`FsReader`] reads the local filesystem. Directories are expanded with
//! `walkdir` and filtered by the `[files]` include/exclude globs; files named
//! explicitly bypass the globs. Returned paths are canonical, so the same
//! file always maps to the same source key however it was named.
//!
//! Entries the walk cannot read are reported in [`Listing::errors`] rather
//! than skipped, so callers can tell an incomplete listing from an empty one.

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::FilesConfig;
use crate::error::{RagError, Result};

#[async_trait]
pub trait FileReader: Send + Sync {
    /// Raw bytes of the file at `path`.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;
    /// Candidate files under `path`: the file itself, every matching file of
    /// a directory, or nothing when `path` does not exist.
    async fn list(&self, path: &str) -> Result<Listing>;
}

/// Expansion of one input path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub files: Vec<String>,
    /// Paths the walk could not descend into, with the reason. Anything
    /// beneath them may exist without appearing in `files`.
    pub errors: Vec<(String, String)>,
}

impl Listing {
    pub fn of(files: Vec<String>) -> Self {
        Self {
            files,
            errors: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct FsReader {
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
    max_file_bytes: u64,
}

impl FsReader {
    pub fn new(config: &FilesConfig) -> anyhow::Result<Self> {
        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(config.exclude_globs.clone());

        Ok(Self {
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&default_excludes)?,
            follow_symlinks: config.follow_symlinks,
            max_file_bytes: config.max_file_bytes,
        })
    }

    fn walk(&self, root: &Path) -> Listing {
        let mut listing = Listing::default();
        let walker = WalkDir::new(root).follow_links(self.follow_symlinks);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let at = e.path().unwrap_or(root).to_string_lossy().to_string();
                    warn!(path = %at, error = %e, "skipping unreadable directory entry");
                    listing.errors.push((at, e.to_string()));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let rel_str = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();

            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }
            listing.files.push(path.to_string_lossy().to_string());
        }
        listing.files.sort();
        listing
    }
}

#[async_trait]
impl FileReader for FsReader {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let unreadable = |reason: String| RagError::FileUnreadable {
            path: path.to_string(),
            reason,
        };
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| unreadable(e.to_string()))?;
        if meta.len() > self.max_file_bytes {
            return Err(unreadable(format!(
                "file is {} bytes, limit is {}",
                meta.len(),
                self.max_file_bytes
            )));
        }
        tokio::fs::read(path)
            .await
            .map_err(|e| unreadable(e.to_string()))
    }

    async fn list(&self, path: &str) -> Result<Listing> {
        let canonical = match tokio::fs::canonicalize(path).await {
            Ok(p) => p,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Listing::default()),
            Err(e) => {
                return Err(RagError::FileUnreadable {
                    path: path.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        if canonical.is_file() {
            return Ok(Listing::of(vec![canonical.to_string_lossy().to_string()]));
        }
        Ok(self.walk(&canonical))
    }
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Split a path list on `;`, `,` or newlines, dropping blanks.
pub fn split_path_list(input: &str) -> Vec<String> {
    input
        .split(|c: char| c == ';' || c == ',' || c == '\n' || c == '\r')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
