//! Configuration parsing and validation.
//!
//! reqtrace is configured via a TOML file (default: `config/reqtrace.toml`).
//! Every section is optional; a missing file behaves like an empty one
//! (see [`Config::minimal`]).
//!
//! # Example
//!
//! ```toml
//! [store]
//! backend = "sqlite"
//! path = "./data/reqtrace.sqlite"
//!
//! [llm]
//! provider = "gemini"          # "gemini", "openai", or "disabled"
//! model = "gemini-2.0-flash"
//! timeout_secs = 60
//!
//! [analysis]
//! chunk_size = 10
//! version = "v3"
//! stage_timeout_secs = 50
//!
//! [search]
//! synonym_limit = 10
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```
//!
//! API keys are read from `GEMINI_API_KEY` / `OPENAI_API_KEY`, never from
//! the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// All-defaults configuration, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// `"sqlite"` or `"memory"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_store_path() -> PathBuf {
    PathBuf::from("./data/reqtrace.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override, e.g. for a proxy or a local mock.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            timeout_secs: default_llm_timeout_secs(),
            max_retries: 0,
            temperature: default_temperature(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Configured model, or the provider's default.
    pub fn resolved_model(&self) -> String {
        if let Some(model) = &self.model {
            return model.clone();
        }
        match self.provider.as_str() {
            "openai" => "gpt-4o-mini".to_string(),
            _ => "gemini-2.0-flash".to_string(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_temperature() -> f64 {
    0.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Deadline for each of the parsing and analysis stages.
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            version: default_version(),
            cache_ttl_secs: default_cache_ttl_secs(),
            stage_timeout_secs: default_stage_timeout_secs(),
        }
    }
}

impl AnalysisConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn default_chunk_size() -> usize {
    10
}
fn default_version() -> String {
    "v3".to_string()
}
fn default_cache_ttl_secs() -> u64 {
    60 * 60 * 24
}
fn default_stage_timeout_secs() -> u64 {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_synonym_limit")]
    pub synonym_limit: usize,
    #[serde(default = "default_synonym_cache_capacity")]
    pub synonym_cache_capacity: usize,
    #[serde(default = "default_synonym_cache_ttl_secs")]
    pub synonym_cache_ttl_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            synonym_limit: default_synonym_limit(),
            synonym_cache_capacity: default_synonym_cache_capacity(),
            synonym_cache_ttl_secs: default_synonym_cache_ttl_secs(),
        }
    }
}

fn default_synonym_limit() -> usize {
    10
}
fn default_synonym_cache_capacity() -> usize {
    1024
}
fn default_synonym_cache_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// Check cross-field constraints. Called by [`load_config`].
pub fn validate(config: &Config) -> Result<()> {
    match config.store.backend.as_str() {
        "sqlite" | "memory" => {}
        other => anyhow::bail!(
            "Unknown store backend: '{}'. Must be sqlite or memory.",
            other
        ),
    }

    match config.llm.provider.as_str() {
        "gemini" | "openai" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be gemini, openai, or disabled.",
            other
        ),
    }

    if config.llm.timeout_secs == 0 {
        anyhow::bail!("llm.timeout_secs must be > 0");
    }

    if config.analysis.chunk_size == 0 {
        anyhow::bail!("analysis.chunk_size must be > 0");
    }

    if config.analysis.version.trim().is_empty() {
        anyhow::bail!("analysis.version must not be empty");
    }

    if config.analysis.stage_timeout_secs == 0 {
        anyhow::bail!("analysis.stage_timeout_secs must be > 0");
    }

    if config.search.synonym_cache_capacity == 0 {
        anyhow::bail!("search.synonym_cache_capacity must be > 0");
    }

    Ok(())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, else fall back to [`Config::minimal`].
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(path = %path.display(), "no config file, using defaults");
        Ok(Config::minimal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.store.backend, "sqlite");
        assert_eq!(config.llm.provider, "gemini");
        assert_eq!(config.llm.resolved_model(), "gemini-2.0-flash");
        assert_eq!(config.llm.max_retries, 0);
        assert_eq!(config.analysis.chunk_size, 10);
        assert_eq!(config.analysis.version, "v3");
        assert_eq!(config.analysis.cache_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.search.synonym_limit, 10);
        assert_eq!(config.server.bind, "127.0.0.1:7341");
    }

    #[test]
    fn openai_model_default() {
        let config: Config = toml::from_str("[llm]\nprovider = \"openai\"").unwrap();
        assert_eq!(config.llm.resolved_model(), "gpt-4o-mini");
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let config: Config = toml::from_str("[analysis]\nchunk_size = 0").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_unknown_provider() {
        let config: Config = toml::from_str("[llm]\nprovider = \"claude\"").unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("Unknown llm provider"));
    }

    #[test]
    fn rejects_unknown_backend() {
        let config: Config = toml::from_str("[store]\nbackend = \"redis\"").unwrap();
        assert!(validate(&config).is_err());
    }
}
