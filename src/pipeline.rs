//! The `rag_answer` state machine.
//!
//! ```text
//!            ┌──────────── rewrite ok ────────────┐
//!            ▼                                    │
//!   ──▶ RETRIEVE ──▶ SCORE ──insufficient, budget left──▶ REWRITE
//!            │         │                                  │
//!          error   sufficient / budget spent         rewrite failed
//!            ▼         ▼                                  │
//!         FAILED    COMPOSE ◀─────────────────────────────┘
//!                      │
//!                 DONE | FAILED
//! ```
//!
//! REWRITE is entered at most `max_rewrites` times per run, so every run
//! terminates after at most `3 * max_rewrites + 3` stages. The cancellation
//! flag is checked before each stage.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::composer::AnswerComposer;
use crate::config::RetrievalConfig;
use crate::error::{PipelineError, RagError};
use crate::models::{Answer, QueryState, RetrievalResult};
use crate::retriever::Retriever;
use crate::rewriter::QueryRewriter;
use crate::scorer::RelevanceScorer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Retrieve,
    Score,
    Rewrite,
    /// Answer from the last retrieved context. The prompt carries the user's
    /// original question; rewrites only steer retrieval and never reach the
    /// composer.
    Compose,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Retrieve => "retrieve",
            Stage::Score => "score",
            Stage::Rewrite => "rewrite",
            Stage::Compose => "compose",
        };
        f.write_str(name)
    }
}

/// Shared cancellation signal. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A completed run: the answer, the final query state and every stage entered, in order.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub answer: Answer,
    pub state: QueryState,
    pub visited: Vec<Stage>,
}

pub struct Orchestrator {
    retriever: Arc<Retriever>,
    scorer: RelevanceScorer,
    rewriter: QueryRewriter,
    composer: AnswerComposer,
    top_k: usize,
    max_rewrites: u32,
    retrieval_retries: u32,
}

impl Orchestrator {
    pub fn new(
        config: &RetrievalConfig,
        retriever: Arc<Retriever>,
        rewriter: QueryRewriter,
        composer: AnswerComposer,
    ) -> Self {
        Self {
            retriever,
            scorer: RelevanceScorer::from_config(config),
            rewriter,
            composer,
            top_k: config.top_k,
            max_rewrites: config.max_rewrites,
            retrieval_retries: config.retrieval_retries.min(1),
        }
    }

    /// Run the pipeline for `query` to completion or failure.
    ///
    /// On failure the error names the stage that was entered (or, for
    /// cancellation, about to be entered) when the run stopped. Log events
    /// of one run share a `run_id` span field.
    pub async fn run(
        &self,
        query: &str,
        cancel: &CancellationFlag,
    ) -> Result<PipelineRun, PipelineError> {
        let span = info_span!("rag_answer", run_id = %Uuid::new_v4());
        self.run_stages(query, cancel).instrument(span).await
    }

    async fn run_stages(
        &self,
        query: &str,
        cancel: &CancellationFlag,
    ) -> Result<PipelineRun, PipelineError> {
        let mut state = QueryState::new(query);
        let mut visited = Vec::new();
        let mut stage = Stage::Retrieve;

        loop {
            if cancel.is_cancelled() {
                info!(stage = %stage, "pipeline cancelled");
                return Err(PipelineError::new(stage, RagError::Cancelled));
            }
            visited.push(stage);

            stage = match stage {
                Stage::Retrieve => {
                    state.retrieved = self
                        .retrieve(&state.current_query, cancel)
                        .await
                        .map_err(|e| PipelineError::new(Stage::Retrieve, e))?;
                    Stage::Score
                }
                Stage::Score => {
                    let verdict = self.scorer.assess(&state.retrieved);
                    info!(
                        sufficient = verdict.sufficient,
                        best_score = ?verdict.best_score,
                        rewrite_count = state.rewrite_count,
                        "scored retrieval"
                    );
                    if verdict.sufficient || state.rewrite_count >= self.max_rewrites {
                        Stage::Compose
                    } else {
                        Stage::Rewrite
                    }
                }
                Stage::Rewrite => match self.rewriter.rewrite(&state).await {
                    Ok(next) => {
                        state.current_query = next;
                        state.rewrite_count += 1;
                        Stage::Retrieve
                    }
                    Err(e) => {
                        warn!(error = %e, "rewrite failed, composing with current results");
                        Stage::Compose
                    }
                },
                Stage::Compose => {
                    let answer = self
                        .composer
                        .compose(&state.original_query, &state.retrieved)
                        .await
                        .map_err(|e| PipelineError::new(Stage::Compose, e))?;
                    info!(
                        grounded = answer.grounded,
                        sources = answer.sources.len(),
                        stages = visited.len(),
                        "pipeline done"
                    );
                    return Ok(PipelineRun {
                        answer,
                        state,
                        visited,
                    });
                }
            };
        }
    }

    async fn retrieve(
        &self,
        query: &str,
        cancel: &CancellationFlag,
    ) -> Result<Vec<RetrievalResult>, RagError> {
        let mut attempt = 0;
        loop {
            match self.retriever.retrieve(query, self.top_k).await {
                Ok(results) => return Ok(results),
                Err(e @ RagError::InvalidInput(_)) => return Err(e),
                Err(e) if attempt < self.retrieval_retries => {
                    warn!(error = %e, attempt, "retrieval failed, retrying");
                    attempt += 1;
                    if cancel.is_cancelled() {
                        return Err(RagError::Cancelled);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
