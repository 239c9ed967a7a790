#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rag_harness::embedding::Embedder;
use rag_harness::llm::{LanguageModel, Prompt};
use rag_harness::models::Chunk;
use rag_harness::pipeline::CancellationFlag;
use rag_harness::store::{ScoredChunk, VectorStore};

/// One dimension per vocabulary word; a text gets 1.0 on every word it contains.
pub struct KeywordEmbedder {
    vocabulary: Vec<&'static str>,
    pub fail: AtomicBool,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(vocabulary: &[&'static str]) -> Self {
        Self {
            vocabulary: vocabulary.to_vec(),
            fail: AtomicBool::new(false),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        self.vocabulary
            .iter()
            .map(|w| if lower.contains(w) { 1.0 } else { 0.0 })
            .collect()
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword"
    }
    fn dims(&self) -> usize {
        self.vocabulary.len()
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("embedding backend down");
        }
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Replays queued completions, then falls back to a default; counts calls.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Result<String, String>>>,
    fallback: Result<String, String>,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<Prompt>>,
    cancel_on_call: Option<CancellationFlag>,
}

impl ScriptedLlm {
    pub fn answering(text: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            cancel_on_call: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fallback: Err(message.to_string()),
            ..Self::answering("")
        }
    }

    pub fn then(self, reply: Result<&str, &str>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(reply.map(str::to_string).map_err(str::to_string));
        self
    }

    pub fn cancelling(mut self, flag: CancellationFlag) -> Self {
        self.cancel_on_call = Some(flag);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn complete(&self, prompt: &Prompt) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());
        if let Some(flag) = &self.cancel_on_call {
            flag.cancel();
        }
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        next.map_err(|e| anyhow::anyhow!(e))
    }
}

/// Vector store whose first `failures` searches fail.
pub struct FlakyStore<S> {
    pub inner: S,
    failures: AtomicUsize,
    pub searches: AtomicUsize,
}

impl<S> FlakyStore<S> {
    pub fn new(inner: S, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
            searches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl<S: VectorStore> VectorStore for FlakyStore<S> {
    async fn upsert(&self, chunks: &[Chunk]) -> rag_harness::error::Result<()> {
        self.inner.upsert(chunks).await
    }
    async fn delete(&self, ids: &[String]) -> rag_harness::error::Result<()> {
        self.inner.delete(ids).await
    }
    async fn search(&self, query: &[f32], k: usize) -> rag_harness::error::Result<Vec<ScoredChunk>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(rag_harness::error::RagError::StoreUnavailable(
                "index offline".to_string(),
            ));
        }
        self.inner.search(query, k).await
    }
    async fn replace(&self, remove_ids: &[String], upserts: &[Chunk]) -> rag_harness::error::Result<()> {
        self.inner.replace(remove_ids, upserts).await
    }
    async fn count(&self) -> rag_harness::error::Result<usize> {
        self.inner.count().await
    }
    async fn get(&self, ids: &[String]) -> rag_harness::error::Result<Vec<Chunk>> {
        self.inner.get(ids).await
    }
}

pub fn chunk(id: &str, path: &str, text: &str, embedding: Vec<f32>) -> Chunk {
    Chunk {
        id: id.to_string(),
        source_path: path.to_string(),
        chunk_index: 0,
        text: text.to_string(),
        embedding,
    }
}

pub fn arc<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
