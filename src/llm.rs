//! Chat-model answerers.
//!
//! - **[`OllamaAnswerer`]**: `POST /api/chat` on a local Ollama instance, non-streaming.
//! - **[`OpenAIAnswerer`]**: `POST /v1/chat/completions`. Requires `OPENAI_API_KEY`.
//! - **[`DisabledAnswerer`]**: errors on use; `retrieve` still works.
//!
//! Both HTTP answerers share the retry policy in [`crate::http`].

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use grounded_core::answer::Answerer;

use crate::config::LlmConfig;
use crate::http;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

pub struct DisabledAnswerer;

#[async_trait]
impl Answerer for DisabledAnswerer {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _system: &str, _user: &str) -> Result<String> {
        bail!("LLM provider is disabled; set [llm].provider in the config")
    }
}

pub struct OllamaAnswerer {
    model: String,
    url: String,
    temperature: f32,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaAnswerer {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let url = config.url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
        Ok(Self {
            model: config.model.clone(),
            url: url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            client: http::client(config.timeout_secs)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Answerer for OllamaAnswerer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "stream": false,
            "messages": messages(system, user),
            "options": { "temperature": self.temperature },
        });
        let resp = http::post_json(
            &self.client,
            "Ollama",
            &format!("{}/api/chat", self.url),
            None,
            &body,
            self.max_retries,
        )
        .await?;
        parse_ollama_chat(&resp)
    }
}

pub struct OpenAIAnswerer {
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAIAnswerer {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let url = config.url.as_deref().unwrap_or(DEFAULT_OPENAI_URL);
        Ok(Self {
            model: config.model.clone(),
            url: url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            client: http::client(config.timeout_secs)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Answerer for OpenAIAnswerer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages(system, user),
        });
        let resp = http::post_json(
            &self.client,
            "OpenAI",
            &format!("{}/v1/chat/completions", self.url),
            Some(&self.api_key),
            &body,
            self.max_retries,
        )
        .await?;
        parse_openai_chat(&resp)
    }
}

fn messages(system: &str, user: &str) -> Value {
    json!([
        { "role": "system", "content": system },
        { "role": "user", "content": user },
    ])
}

fn parse_ollama_chat(resp: &Value) -> Result<String> {
    resp.pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))
}

fn parse_openai_chat(resp: &Value) -> Result<String> {
    resp.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

/// Create the [`Answerer`] named by `config.provider`.
pub fn create_answerer(config: &LlmConfig) -> Result<Arc<dyn Answerer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledAnswerer)),
        "ollama" => Ok(Arc::new(OllamaAnswerer::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIAnswerer::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
