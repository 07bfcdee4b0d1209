/// Configuration module for lexrag.
///
/// Handles loading, validating, and providing default configuration values
/// for every pipeline stage and the web server.
use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::retrieval::Metric;

/// Default location of the config file; a template is written here on first run.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

// ── Default value functions ──────────────────────────────────────────

fn default_source_pdf() -> String {
    "./data/national_penal_code_2017.pdf".to_string()
}

fn default_sections_path() -> String {
    "./data/sections.json".to_string()
}

fn default_chunks_path() -> String {
    "./data/chunks.json".to_string()
}

fn default_embeddings_path() -> String {
    "./data/embeddings.bin".to_string()
}

fn default_metadata_path() -> String {
    "./data/metadata.json".to_string()
}

fn default_chunk_size() -> usize {
    800
}

fn default_chunk_id_prefix() -> String {
    "npc2017".to_string()
}

fn default_search_top_k() -> usize {
    6
}

fn default_max_top_k() -> usize {
    10
}

fn default_model_name() -> String {
    "all-mpnet-base-v2".to_string()
}

fn default_dimensions() -> usize {
    768
}

fn default_model_dir() -> String {
    "models/all-mpnet-base-v2".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_llm_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_max_tokens() -> usize {
    350
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_id_prefix")]
    pub chunk_id_prefix: String,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,

    #[serde(default)]
    pub metric: Metric,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Artifact locations shared between the batch stages and the server.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_source_pdf")]
    pub source_pdf: String,

    #[serde(default = "default_sections_path")]
    pub sections: String,

    #[serde(default = "default_chunks_path")]
    pub chunks: String,

    #[serde(default = "default_embeddings_path")]
    pub embeddings: String,

    #[serde(default = "default_metadata_path")]
    pub metadata: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderBackend {
    #[default]
    Onnx,
    /// Deterministic hashing embedder, for offline runs and fixtures.
    Hash,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default)]
    pub backend: EmbedderBackend,

    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of an OpenAI-compatible chat-completions API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            chunk_size: default_chunk_size(),
            chunk_id_prefix: default_chunk_id_prefix(),
            search_top_k: default_search_top_k(),
            max_top_k: default_max_top_k(),
            metric: Metric::default(),
            model: ModelConfig::default(),
            generation: GenerationConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_pdf: default_source_pdf(),
            sections: default_sections_path(),
            chunks: default_chunks_path(),
            embeddings: default_embeddings_path(),
            metadata: default_metadata_path(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: EmbedderBackend::default(),
            name: default_model_name(),
            dimensions: default_dimensions(),
            model_dir: default_model_dir(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            base_url: default_base_url(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and, for the
    /// default path only, writes a template next to the binary's cwd.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(self.max_top_k > 0, "max_top_k must be positive");
        anyhow::ensure!(
            self.search_top_k > 0 && self.search_top_k <= self.max_top_k,
            "search_top_k must be between 1 and max_top_k ({})",
            self.max_top_k
        );
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(
            self.model.batch_size > 0,
            "model.batch_size must be positive"
        );
        anyhow::ensure!(
            !self.chunk_id_prefix.is_empty()
                && self
                    .chunk_id_prefix
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
            "chunk_id_prefix must be non-empty ASCII alphanumerics, '_' or '-'"
        );
        self.bind_addr()?;
        Ok(())
    }

    /// Parsed server bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("invalid server.bind address: {}", self.server.bind))
    }
}

impl GenerationConfig {
    /// Read the API key from the configured environment variable.
    ///
    /// Returns `None` when the variable is unset or blank.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.search_top_k, 6);
        assert_eq!(config.max_top_k, 10);
        assert_eq!(config.chunk_id_prefix, "npc2017");
        assert_eq!(config.model.dimensions, 768);
        assert_eq!(config.model.name, "all-mpnet-base-v2");
        assert_eq!(config.model.backend, EmbedderBackend::Onnx);
        assert_eq!(config.metric, Metric::Cosine);
        assert_eq!(config.generation.model, "llama-3.1-8b-instant");
        assert_eq!(config.generation.api_key_env, "GROQ_API_KEY");
        assert_eq!(config.generation.max_tokens, 350);
        assert_eq!(config.generation.temperature, 0.0);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"chunk_size": 1000, "paths": {"metadata": "./meta.json"}, "model": {"backend": "hash", "dimensions": 64}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.paths.metadata, "./meta.json");
        assert_eq!(config.paths.chunks, "./data/chunks.json");
        assert_eq!(config.model.backend, EmbedderBackend::Hash);
        assert_eq!(config.model.dimensions, 64);
        assert_eq!(config.model.batch_size, 32);
        assert_eq!(config.search_top_k, 6);
    }

    #[test]
    fn test_metric_from_json() {
        let config: Config = serde_json::from_str(r#"{"metric": "inner_product"}"#).unwrap();
        assert_eq!(config.metric, Metric::InnerProduct);
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_bad_chunk_size() {
        let mut config = Config::default();
        config.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_top_k_above_max() {
        let mut config = Config::default();
        config.search_top_k = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_prefix() {
        let mut config = Config::default();
        config.chunk_id_prefix = "npc 2017".to_string();
        assert!(config.validate().is_err());
        config.chunk_id_prefix = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_bind() {
        let mut config = Config::default();
        config.server.bind = "localhost".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_non_default_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.chunk_size, 800);
        assert!(!path.exists(), "template is only written for the default path");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.chunk_id_prefix = "mcc2017".to_string();
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.chunk_id_prefix, "mcc2017");
        assert_eq!(loaded.model.name, config.model.name);
    }

    #[test]
    fn test_api_key_missing_env() {
        let mut generation = GenerationConfig::default();
        generation.api_key_env = "LEXRAG_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        assert!(generation.api_key().is_none());
    }
}
