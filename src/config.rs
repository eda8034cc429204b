//! TOML configuration parsing and validation.
//!
//! Every table except `[db]` is optional and falls back to defaults that
//! produce a working local setup. After parsing, a handful of environment
//! variables can override individual values (see [`apply_env_overrides`]).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use grounded_core::chunk::SplitConfig;
use grounded_core::PipelineParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    /// Optional label stored on every chunk as `extra.domain`.
    #[serde(default)]
    pub domain: Option<String>,
    /// Emit one `"<path>: <value>"` passage per scalar JSON leaf.
    #[serde(default = "default_true")]
    pub json_leaf_passages: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            min_chars: default_min_chars(),
            domain: None,
            json_leaf_passages: true,
        }
    }
}

impl IngestConfig {
    pub fn split_config(&self) -> SplitConfig {
        SplitConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            min_chars: self.min_chars,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./dataset/refined")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.json".to_string()]
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    100
}
fn default_min_chars() -> usize {
    120
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// The query-side knobs, mapped one-to-one onto [`PipelineParams`].
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "default_min_context_chars")]
    pub min_context_chars: usize,
    #[serde(default = "default_true")]
    pub use_reranker: bool,
    #[serde(default = "default_per_source_cap")]
    pub per_source_cap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            fetch_k: default_fetch_k(),
            score_threshold: default_score_threshold(),
            min_context_chars: default_min_context_chars(),
            use_reranker: true,
            per_source_cap: default_per_source_cap(),
        }
    }
}

impl RetrievalConfig {
    pub fn pipeline_params(&self) -> PipelineParams {
        PipelineParams {
            top_k: self.top_k,
            fetch_k: self.fetch_k,
            score_threshold: self.score_threshold,
            min_context_chars: self.min_context_chars,
            use_reranker: self.use_reranker,
            per_source_cap: self.per_source_cap,
        }
    }
}

fn default_top_k() -> usize {
    6
}
fn default_fetch_k() -> usize {
    24
}
fn default_score_threshold() -> f32 {
    0.18
}
fn default_min_context_chars() -> usize {
    600
}
fn default_per_source_cap() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankerConfig {
    #[serde(default = "default_reranker_provider")]
    pub provider: String,
    #[serde(default = "default_reranker_model")]
    pub model: String,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: default_reranker_provider(),
            model: default_reranker_model(),
        }
    }
}

fn default_reranker_provider() -> String {
    "disabled".to_string()
}
fn default_reranker_model() -> String {
    "bge-reranker-base".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            url: None,
            temperature: default_temperature(),
            max_retries: default_llm_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "ollama".to_string()
}
fn default_llm_model() -> String {
    "llama3".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_llm_max_retries() -> u32 {
    3
}
fn default_llm_timeout_secs() -> u64 {
    120
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Parse a config document without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Apply environment overrides on top of parsed values. `lookup` returns
/// the variable's value, if set.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("GROUNDED_DB_PATH") {
        config.db.path = PathBuf::from(v);
    }
    if let Some(v) = lookup("GROUNDED_DATA_DIR") {
        config.ingest.data_dir = PathBuf::from(v);
    }
    if let Some(v) = lookup("EMBEDDING_MODEL") {
        config.embedding.model = Some(v);
    }
    if let Some(v) = lookup("CHAT_MODEL") {
        config.llm.model = v;
    }
    if let Some(v) = lookup("RAG_TOP_K") {
        config.retrieval.top_k = parse_env("RAG_TOP_K", &v)?;
    }
    if let Some(v) = lookup("CHUNK_SIZE") {
        config.ingest.chunk_size = parse_env("CHUNK_SIZE", &v)?;
    }
    if let Some(v) = lookup("CHUNK_OVERLAP") {
        config.ingest.chunk_overlap = parse_env("CHUNK_OVERLAP", &v)?;
    }
    if let Some(v) = lookup("MIN_CHARS") {
        config.ingest.min_chars = parse_env("MIN_CHARS", &v)?;
    }
    Ok(())
}

fn parse_env(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a non-negative integer, got '{}'", key, value))
}

pub fn validate(config: &Config) -> Result<()> {
    // Ingest
    if config.ingest.chunk_size == 0 {
        bail!("ingest.chunk_size must be > 0");
    }
    if config.ingest.chunk_overlap >= config.ingest.chunk_size {
        bail!("ingest.chunk_overlap must be < ingest.chunk_size");
    }

    // Retrieval
    let r = &config.retrieval;
    if r.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if r.fetch_k < r.top_k {
        bail!("retrieval.fetch_k must be >= retrieval.top_k");
    }
    if !(0.0..=1.0).contains(&r.score_threshold) {
        bail!("retrieval.score_threshold must be in [0.0, 1.0]");
    }
    if r.per_source_cap < 1 {
        bail!("retrieval.per_source_cap must be >= 1");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.provider != "local" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Reranker
    match config.reranker.provider.as_str() {
        "disabled" | "local" => {}
        other => bail!(
            "Unknown reranker provider: '{}'. Must be disabled or local.",
            other
        ),
    }

    // LLM
    match config.llm.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MINIMAL: &str = "[db]\npath = \"./data/grounded.sqlite\"\n";

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.ingest.chunk_size, 1000);
        assert_eq!(config.ingest.chunk_overlap, 100);
        assert_eq!(config.ingest.min_chars, 120);
        assert_eq!(config.ingest.include_globs, vec!["**/*.md", "**/*.json"]);
        assert_eq!(config.retrieval.pipeline_params(), PipelineParams::default());
        assert_eq!(config.llm.model, "llama3");
        assert!((config.llm.temperature - 0.2).abs() < f32::EPSILON);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_retrieval_table_overrides() {
        let config = parse_config(&format!(
            "{}\n[retrieval]\ntop_k = 4\nfetch_k = 10\nscore_threshold = 0.3\nuse_reranker = false\n",
            MINIMAL
        ))
        .unwrap();
        validate(&config).unwrap();
        let p = config.retrieval.pipeline_params();
        assert_eq!(p.top_k, 4);
        assert_eq!(p.fetch_k, 10);
        assert!(!p.use_reranker);
        assert_eq!(p.per_source_cap, 2);
    }

    #[test]
    fn test_rejects_fetch_k_below_top_k() {
        let config = parse_config(&format!("{}\n[retrieval]\ntop_k = 8\nfetch_k = 4\n", MINIMAL)).unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("fetch_k"));
    }

    #[test]
    fn test_rejects_overlap_not_below_size() {
        let config = parse_config(&format!(
            "{}\n[ingest]\nchunk_size = 100\nchunk_overlap = 100\n",
            MINIMAL
        ))
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_unknown_providers() {
        for table in [
            "[embedding]\nprovider = \"magic\"",
            "[reranker]\nprovider = \"remote\"",
            "[llm]\nprovider = \"gpt\"",
        ] {
            let config = parse_config(&format!("{}\n{}\n", MINIMAL, table)).unwrap();
            assert!(validate(&config).is_err(), "accepted {}", table);
        }
    }

    #[test]
    fn test_openai_embedding_requires_model_and_dims() {
        let config = parse_config(&format!("{}\n[embedding]\nprovider = \"openai\"\n", MINIMAL)).unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = parse_config(MINIMAL).unwrap();
        let env: HashMap<&str, &str> = [
            ("RAG_TOP_K", "3"),
            ("CHUNK_SIZE", "500"),
            ("CHAT_MODEL", "mistral"),
            ("GROUNDED_DB_PATH", "/tmp/x.sqlite"),
        ]
        .into_iter()
        .collect();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.ingest.chunk_size, 500);
        assert_eq!(config.llm.model, "mistral");
        assert_eq!(config.db.path, PathBuf::from("/tmp/x.sqlite"));
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = parse_config(MINIMAL).unwrap();
        let err = apply_env_overrides(&mut config, |k| (k == "RAG_TOP_K").then(|| "six".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("RAG_TOP_K"));
    }
}
