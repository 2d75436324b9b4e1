//! Configuration management for memloader.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Command-line flags (applied by each command)
//! 2. Environment variables (MEMLOADER_*, plus MEM0_API_KEY and OPENAI_API_KEY)
//! 3. Config file ($MEMLOADER_CONFIG, or config.toml in the data directory)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use memloader_core::consolidation::ConsolidationConfig;
use memloader_core::extract::{ExtractOptions, OllamaConfig, OpenAiConfig, Provider};
use memloader_core::loader::{Mem0Config, OpenMemoryConfig, Target, UploadOptions, UploadPolicy};
use memloader_core::transcript::ChunkConfig;

use crate::error::CliError;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// LLM extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Conversation chunking
    #[serde(default)]
    pub chunking: ChunkConfig,

    /// Filtering and deduplication
    #[serde(default)]
    pub consolidation: ConsolidationConfig,

    /// Memory store settings
    #[serde(default)]
    pub loader: LoaderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub provider: Provider,

    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,

    /// Seconds between retries
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,

    #[serde(default)]
    pub ollama: OllamaConfig,

    #[serde(default)]
    pub openai: OpenAiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default)]
    pub target: Target,

    /// Memories per upload batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Seconds to pause between upload batches
    #[serde(default = "default_upload_pause")]
    pub upload_pause_secs: f64,

    #[serde(default)]
    pub policy: UploadPolicy,

    #[serde(default)]
    pub mem0: Mem0Config,

    #[serde(default)]
    pub openmemory: OpenMemoryConfig,
}

// Default value functions
fn default_requests_per_minute() -> u32 {
    60
}

fn default_retry_attempts() -> usize {
    3
}

fn default_retry_delay() -> f64 {
    1.0
}

fn default_batch_size() -> usize {
    100
}

fn default_upload_pause() -> f64 {
    1.0
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "memloader", "memloader") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".memloader")
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            requests_per_minute: default_requests_per_minute(),
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
            ollama: OllamaConfig::default(),
            openai: OpenAiConfig::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn options(&self) -> ExtractOptions {
        ExtractOptions {
            requests_per_minute: self.requests_per_minute,
            retry_attempts: self.retry_attempts,
            retry_delay: self.retry_delay,
        }
    }

    /// Model name of the active provider.
    pub fn model(&self) -> &str {
        match self.provider {
            Provider::Ollama => &self.ollama.model,
            Provider::OpenAi => &self.openai.model,
        }
    }

    /// Override the model of the active provider.
    pub fn set_model(&mut self, model: String) {
        match self.provider {
            Provider::Ollama => self.ollama.model = model,
            Provider::OpenAi => self.openai.model = model,
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            target: Target::default(),
            batch_size: default_batch_size(),
            upload_pause_secs: default_upload_pause(),
            policy: UploadPolicy::default(),
            mem0: Mem0Config::default(),
            openmemory: OpenMemoryConfig::default(),
        }
    }
}

impl LoaderConfig {
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            batch_size: self.batch_size,
            pause: Duration::from_secs_f64(self.upload_pause_secs.max(0.0)),
        }
    }

    /// Set the user id for every store.
    pub fn set_user_id(&mut self, user_id: &str) {
        self.mem0.user_id = user_id.to_string();
        self.openmemory.user_id = user_id.to_string();
    }

    pub fn user_id(&self) -> &str {
        match self.target {
            Target::Mem0 => &self.mem0.user_id,
            Target::OpenMemory => &self.openmemory.user_id,
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path(), |key| std::env::var(key).ok())
    }

    /// Load from `path` (defaults if missing), then apply environment
    /// overrides read through `env`.
    pub fn load_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Config::default()
        };

        config.apply_env(env)?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("MEMLOADER_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), CliError> {
        let var = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = var("MEMLOADER_LLM_PROVIDER") {
            self.extraction.provider = parse_env("MEMLOADER_LLM_PROVIDER", &v)?;
        }
        if let Some(v) = var("MEMLOADER_OLLAMA_MODEL") {
            self.extraction.ollama.model = v;
        }
        if let Some(v) = var("MEMLOADER_OLLAMA_BASE_URL") {
            self.extraction.ollama.base_url = v;
        }
        if let Some(v) = var("MEMLOADER_OLLAMA_TIMEOUT") {
            self.extraction.ollama.timeout_secs = parse_env("MEMLOADER_OLLAMA_TIMEOUT", &v)?;
        }
        if let Some(v) = var("MEMLOADER_OPENAI_MODEL") {
            self.extraction.openai.model = v;
        }
        if let Some(v) = var("MEMLOADER_OPENAI_API_KEY").or_else(|| var("OPENAI_API_KEY")) {
            self.extraction.openai.api_key = Some(v);
        }
        if let Some(v) = var("MEMLOADER_REQUESTS_PER_MINUTE") {
            self.extraction.requests_per_minute = parse_env("MEMLOADER_REQUESTS_PER_MINUTE", &v)?;
        }
        if let Some(v) = var("MEMLOADER_RETRY_ATTEMPTS") {
            self.extraction.retry_attempts = parse_env("MEMLOADER_RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = var("MEMLOADER_RETRY_DELAY") {
            self.extraction.retry_delay = parse_env("MEMLOADER_RETRY_DELAY", &v)?;
        }
        if let Some(v) = var("MEMLOADER_CHUNK_SIZE") {
            self.chunking.chunk_size = parse_env("MEMLOADER_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = var("MEMLOADER_CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = parse_env("MEMLOADER_CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = var("MEMLOADER_CONFIDENCE_THRESHOLD") {
            self.consolidation.confidence_threshold = parse_env("MEMLOADER_CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = var("MEMLOADER_SIMILARITY_THRESHOLD") {
            self.consolidation.similarity_threshold = parse_env("MEMLOADER_SIMILARITY_THRESHOLD", &v)?;
        }
        if let Some(v) = var("MEMLOADER_TARGET") {
            self.loader.target = parse_env("MEMLOADER_TARGET", &v)?;
        }
        if let Some(v) = var("MEMLOADER_BATCH_SIZE") {
            self.loader.batch_size = parse_env("MEMLOADER_BATCH_SIZE", &v)?;
        }
        if let Some(v) = var("MEMLOADER_MEM0_API_KEY").or_else(|| var("MEM0_API_KEY")) {
            self.loader.mem0.api_key = Some(v);
        }
        if let Some(v) = var("MEMLOADER_OPENMEMORY_URL") {
            self.loader.openmemory.base_url = v;
        }
        if let Some(v) = var("MEMLOADER_USER_ID") {
            self.loader.set_user_id(&v);
        }
        Ok(())
    }

    /// Check every section, reporting the first problem.
    pub fn validate(&self) -> Result<()> {
        self.consolidation.validate().context("Invalid [consolidation] settings")?;
        self.chunking.validate().context("Invalid [chunking] settings")?;
        self.extraction.options().validate().context("Invalid [extraction] settings")?;
        if self.loader.batch_size == 0 {
            anyhow::bail!("loader.batch_size must be greater than zero");
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, CliError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| CliError::invalid_value(key, value, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.extraction.provider, Provider::Ollama);
        assert_eq!(config.extraction.model(), "nuextract");
        assert_eq!(config.chunking.chunk_size, 1500);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.consolidation.confidence_threshold, 0.7);
        assert_eq!(config.loader.batch_size, 100);
        assert_eq!(config.loader.target, Target::Mem0);
        assert_eq!(config.loader.user_id(), "chatgpt_import");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml"), no_env).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[extraction]
provider = "openai"

[extraction.openai]
model = "gpt-4.1-nano"

[consolidation]
confidence_threshold = 0.8
similarity = "bigram"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path, no_env).unwrap();
        assert_eq!(config.extraction.provider, Provider::OpenAi);
        assert_eq!(config.extraction.model(), "gpt-4.1-nano");
        assert_eq!(config.extraction.openai.base_url, "https://api.openai.com");
        assert_eq!(config.consolidation.confidence_threshold, 0.8);
        assert_eq!(config.consolidation.similarity_threshold, 0.7);
        assert_eq!(config.extraction.requests_per_minute, 60);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[loader]\nbatch_size = 10\n").unwrap();

        let env = env_from(&[
            ("MEMLOADER_BATCH_SIZE", "25"),
            ("MEM0_API_KEY", "m0-key"),
            ("MEMLOADER_TARGET", "openmemory"),
            ("MEMLOADER_USER_ID", "alice"),
            ("MEMLOADER_CHUNK_SIZE", ""),
        ]);
        let config = Config::load_from(&path, env).unwrap();

        assert_eq!(config.loader.batch_size, 25);
        assert_eq!(config.loader.mem0.api_key.as_deref(), Some("m0-key"));
        assert_eq!(config.loader.target, Target::OpenMemory);
        assert_eq!(config.loader.user_id(), "alice");
        assert_eq!(config.loader.mem0.user_id, "alice");
        assert_eq!(config.chunking.chunk_size, 1500);
    }

    #[test]
    fn test_prefixed_key_wins_over_generic() {
        let env = env_from(&[("MEMLOADER_OPENAI_API_KEY", "sk-a"), ("OPENAI_API_KEY", "sk-b")]);
        let mut config = Config::default();
        config.apply_env(env).unwrap();
        assert_eq!(config.extraction.openai.api_key.as_deref(), Some("sk-a"));
    }

    #[test]
    fn test_bad_env_value() {
        let env = env_from(&[("MEMLOADER_CONFIDENCE_THRESHOLD", "high")]);
        let err = Config::default().apply_env(env).unwrap_err();
        assert!(matches!(err, CliError::InvalidValue { ref key, .. } if key == "MEMLOADER_CONFIDENCE_THRESHOLD"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut config = Config::default();
        config.consolidation.confidence_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.loader.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unbounded_retry_delay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[extraction]\nretry_delay = inf\n").unwrap();

        let config = Config::load_from(&path, no_env).unwrap();
        assert!(config.extraction.retry_delay.is_infinite());
        assert!(config.validate().is_err());

        let config = Config::load_from(&path, env_from(&[("MEMLOADER_RETRY_DELAY", "-2")])).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.extraction.set_model("llama3.2:3b".into());
        config.loader.set_user_id("bob");
        config.save(&path).unwrap();

        let loaded = Config::load_from(&path, no_env).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_upload_options() {
        let mut config = LoaderConfig::default();
        config.upload_pause_secs = 0.5;
        let options = config.upload_options();
        assert_eq!(options.batch_size, 100);
        assert_eq!(options.pause, Duration::from_millis(500));
    }
}
