//! Query reformulation for weak retrievals.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{RagError, Result};
use crate::llm::{LanguageModel, Prompt};
use crate::models::QueryState;

const REWRITE_SYSTEM: &str = "You rewrite search queries for a document retrieval system. \
The previous query did not retrieve relevant passages. Produce one alternative query that \
keeps the user's intent but uses different, more specific wording. \
Reply with the query only, on a single line.";

/// Results summarized in the rewrite prompt.
const SUMMARY_RESULTS: usize = 3;
const SUMMARY_SNIPPET_CHARS: usize = 160;

pub struct QueryRewriter {
    llm: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// A new query for `state`. The state itself is left untouched.
    pub async fn rewrite(&self, state: &QueryState) -> Result<String> {
        let prompt = build_prompt(state);
        let completion = tokio::time::timeout(self.timeout, self.llm.complete(&prompt))
            .await
            .map_err(|_| RagError::RewriteFailed("language model timed out".to_string()))?
            .map_err(|e| RagError::RewriteFailed(format!("{:#}", e)))?;

        let query = normalize(&completion)
            .ok_or_else(|| RagError::RewriteFailed("empty rewrite".to_string()))?;
        if query.eq_ignore_ascii_case(state.current_query.trim()) {
            return Err(RagError::RewriteFailed(
                "rewrite repeats the current query".to_string(),
            ));
        }
        debug!(from = %state.current_query, to = %query, "rewrote query");
        Ok(query)
    }
}

pub fn build_prompt(state: &QueryState) -> Prompt {
    let mut user = format!(
        "Original question: {}\nCurrent query: {}\n",
        state.original_query, state.current_query
    );

    if state.retrieved.is_empty() {
        user.push_str("Retrieved: nothing retrieved\n");
    } else {
        user.push_str("Retrieved (not relevant enough):\n");
        for r in state.retrieved.iter().take(SUMMARY_RESULTS) {
            let snippet: String = r
                .chunk
                .text
                .chars()
                .take(SUMMARY_SNIPPET_CHARS)
                .collect::<String>()
                .replace('\n', " ");
            user.push_str(&format!(
                "- [{:.3}] {}: {}\n",
                r.score, r.chunk.source_path, snippet
            ));
        }
    }
    user.push_str("\nRewritten query:");

    Prompt {
        system: REWRITE_SYSTEM.to_string(),
        user,
    }
}

/// First non-empty line, without a `Query:` label or surrounding quotes.
pub fn normalize(completion: &str) -> Option<String> {
    let line = completion.lines().map(str::trim).find(|l| !l.is_empty())?;

    let lower = line.to_ascii_lowercase();
    let mut line = line;
    for label in ["rewritten query:", "query:"] {
        if lower.starts_with(label) {
            line = line[label.len()..].trim();
            break;
        }
    }

    let line = line
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}
