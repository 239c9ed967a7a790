//! Indexed-source listing for `rag sources` and the `list_sources` tool.

use serde::Serialize;

use crate::metadata::is_memory_source;
use crate::models::SourceRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
    pub path: String,
    /// `"file"` or `"memory"`.
    pub kind: &'static str,
    pub chunks: usize,
    /// First 12 hex characters of the content fingerprint.
    pub fingerprint: String,
    /// RFC 3339, UTC.
    pub indexed_at: String,
}

pub fn summarize(records: &[SourceRecord]) -> Vec<SourceStatus> {
    records
        .iter()
        .map(|r| SourceStatus {
            path: r.path.clone(),
            kind: if is_memory_source(&r.path) { "memory" } else { "file" },
            chunks: r.chunk_ids.len(),
            fingerprint: r.content_fingerprint.chars().take(12).collect(),
            indexed_at: r.indexed_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        })
        .collect()
}

pub fn print_sources(sources: &[SourceStatus]) {
    if sources.is_empty() {
        println!("No sources indexed.");
        return;
    }
    println!("{:<8} {:>6}  {:<12}  {:<20}  PATH", "KIND", "CHUNKS", "FINGERPRINT", "INDEXED");
    for s in sources {
        println!(
            "{:<8} {:>6}  {:<12}  {:<20}  {}",
            s.kind, s.chunks, s.fingerprint, s.indexed_at, s.path
        );
    }
    let chunks: usize = sources.iter().map(|s| s.chunks).sum();
    println!("\n{} sources, {} chunks", sources.len(), chunks);
}
