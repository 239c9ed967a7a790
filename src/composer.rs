//! Grounded answer composition.
//!
//! With no retrieved passages the composer returns
//! [`INSUFFICIENT_INFORMATION`] without calling the language model. Otherwise
//! it packs the passages, grouped by source, into a bounded context block
//! and asks the model to answer from that context alone.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{RagError, Result};
use crate::llm::{LanguageModel, Prompt};
use crate::models::{Answer, RetrievalResult};

pub const INSUFFICIENT_INFORMATION: &str =
    "No relevant documents found. Please supply documentation first.";

const ANSWER_SYSTEM: &str = "Use the provided context to answer the user's question directly \
and concisely. Answer only from the context. If the context does not contain the answer, \
say that the knowledge base does not cover it.";

pub struct AnswerComposer {
    llm: Arc<dyn LanguageModel>,
    timeout: Duration,
    max_context_chars: usize,
}

impl AnswerComposer {
    pub fn new(llm: Arc<dyn LanguageModel>, timeout: Duration, max_context_chars: usize) -> Self {
        Self {
            llm,
            timeout,
            max_context_chars,
        }
    }

    pub async fn compose(&self, query: &str, results: &[RetrievalResult]) -> Result<Answer> {
        if results.is_empty() {
            return Ok(Answer {
                text: INSUFFICIENT_INFORMATION.to_string(),
                sources: Vec::new(),
                grounded: false,
            });
        }

        let (context, sources) = build_context(results, self.max_context_chars);
        debug!(sources = sources.len(), chars = context.len(), "composing answer");
        let prompt = Prompt {
            system: format!("{}\n\nContext:\n{}", ANSWER_SYSTEM, context),
            user: query.to_string(),
        };

        let text = tokio::time::timeout(self.timeout, self.llm.complete(&prompt))
            .await
            .map_err(|_| RagError::GenerationFailed("language model timed out".to_string()))?
            .map_err(|e| RagError::GenerationFailed(format!("{:#}", e)))?;

        let text = text.trim();
        if text.is_empty() {
            return Err(RagError::GenerationFailed("empty completion".to_string()));
        }

        Ok(Answer {
            text: text.to_string(),
            sources,
            grounded: true,
        })
    }
}

/// Context block and the sources actually placed in it.
///
/// Passages are grouped by source path in order of first appearance. Once
/// `max_chars` is reached the remaining passages are dropped; the very first
/// passage is truncated rather than dropped so the block is never empty.
pub fn build_context(results: &[RetrievalResult], max_chars: usize) -> (String, Vec<String>) {
    let mut groups: Vec<(&str, Vec<&RetrievalResult>)> = Vec::new();
    for r in results {
        match groups.iter().position(|(p, _)| *p == r.chunk.source_path) {
            Some(i) => groups[i].1.push(r),
            None => groups.push((r.chunk.source_path.as_str(), vec![r])),
        }
    }

    let mut context = String::new();
    let mut used = 0usize;
    let mut sources = Vec::new();

    for (path, members) in groups {
        let header = format!("[Source: {}]\n", path);
        let header_len = header.chars().count();
        let mut section = String::new();
        let mut section_len = 0usize;
        let mut full = false;

        for r in members {
            let remaining = max_chars.saturating_sub(used + header_len + section_len);
            let text_len = r.chunk.text.chars().count();
            if text_len + 2 <= remaining {
                section.push_str(&r.chunk.text);
                section.push_str("\n\n");
                section_len += text_len + 2;
            } else {
                if used == 0 && section.is_empty() {
                    let cut: String = r
                        .chunk
                        .text
                        .chars()
                        .take(remaining.saturating_sub(2).max(1))
                        .collect();
                    section_len += cut.chars().count() + 2;
                    section.push_str(&cut);
                    section.push_str("\n\n");
                }
                full = true;
                break;
            }
        }

        if !section.is_empty() {
            context.push_str(&header);
            context.push_str(&section);
            used += header_len + section_len;
            sources.push(path.to_string());
        }
        if full {
            break;
        }
    }

    (context.trim_end().to_string(), sources)
}
