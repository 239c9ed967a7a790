//! Language-model abstraction.
//!
//! [`LanguageModel::complete`] turns a [`Prompt`] into a completion string.
//! The rewriter and the composer are its only callers. Providers:
//!
//! | Config Value | Provider | Endpoint |
//! |-------------|----------|----------|
//! | `"disabled"` | [`DisabledLanguageModel`] | none |
//! | `"openai"` | [`OpenAIChatModel`] | `{url}/chat/completions` |
//! | `"ollama"` | [`OllamaChatModel`] | `{url}/api/chat` |

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{LlmConfig, TimeoutConfig};
use crate::http::post_json_with_retry;

/// A system instruction plus the user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String>;
}

pub struct DisabledLanguageModel;

#[async_trait]
impl LanguageModel for DisabledLanguageModel {
    async fn complete(&self, _prompt: &Prompt) -> Result<String> {
        bail!("Language model is disabled. Set [llm] provider in config.")
    }
}

fn messages(prompt: &Prompt) -> serde_json::Value {
    serde_json::json!([
        { "role": "system", "content": prompt.system },
        { "role": "user", "content": prompt.user }
    ])
}

/// OpenAI chat completions (or a compatible gateway via `llm.url`).
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIChatModel {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    temperature: f32,
    max_retries: u32,
}

impl OpenAIChatModel {
    pub fn new(config: &LlmConfig, timeouts: &TimeoutConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(timeouts.generation())
                .build()?,
            api_key,
            url: format!("{}/chat/completions", base.trim_end_matches('/')),
            model,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages(prompt),
        });
        let json = post_json_with_retry(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;

        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
    }
}

/// Chat through a local Ollama instance (default `http://localhost:11434`).
pub struct OllamaChatModel {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    max_retries: u32,
}

impl OllamaChatModel {
    pub fn new(config: &LlmConfig, timeouts: &TimeoutConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Ollama provider"))?;
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(timeouts.generation())
                .build()?,
            url: format!("{}/api/chat", base.trim_end_matches('/')),
            model,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaChatModel {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "options": { "temperature": self.temperature },
            "messages": messages(prompt),
        });
        let json =
            post_json_with_retry(&self.client, &self.url, None, &body, self.max_retries, "Ollama")
                .await?;

        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message.content"))
    }
}

pub fn create_language_model(
    config: &LlmConfig,
    timeouts: &TimeoutConfig,
) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledLanguageModel)),
        "openai" => Ok(Arc::new(OpenAIChatModel::new(config, timeouts)?)),
        "ollama" => Ok(Arc::new(OllamaChatModel::new(config, timeouts)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
