//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::routing::{
    AdaptiveConfig, ExpertKind, PerformanceConfig, StrategyKind, StrategyWeight, VectorConfig,
};

/// Environment variable overriding the embedding host
pub const HOST_ENV_VAR: &str = "OLLAMA_HOST";

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV_VAR: &str = "SWITCHBOARD_CONFIG_DIR";

/// Switchboard configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub vector: VectorConfig,
    pub performance: PerformanceConfig,
    pub adaptive: AdaptiveConfig,
}

/// Settings for the embedding service and its cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub host: String,
    pub model: String,
    pub dimension: usize,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub timeout_secs: u64,
    pub cache_capacity: usize,
    /// Zero disables expiry
    pub cache_ttl_secs: u64,
    pub init_concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dimension: 768,
            max_retries: 3,
            backoff_base_ms: 500,
            timeout_secs: 60,
            cache_capacity: 10_000,
            cache_ttl_secs: 0,
            init_concurrency: 4,
        }
    }
}

impl EmbeddingConfig {
    /// Host to contact, preferring the environment override
    pub fn resolved_host(&self) -> String {
        env::var(HOST_ENV_VAR)
            .ok()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| self.host.clone())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.host.starts_with("http://") || self.host.starts_with("https://")) {
            return Err(Error::config(format!(
                "embedding.host must start with http:// or https://, got '{}'",
                self.host
            )));
        }
        if self.model.trim().is_empty() {
            return Err(Error::config("embedding.model must not be empty"));
        }
        if self.dimension == 0 {
            return Err(Error::config("embedding.dimension must be positive"));
        }
        if self.max_retries == 0 {
            return Err(Error::config("embedding.max_retries must be at least 1"));
        }
        if self.timeout_secs == 0 {
            return Err(Error::config("embedding.timeout_secs must be positive"));
        }
        if self.cache_capacity == 0 {
            return Err(Error::config("embedding.cache_capacity must be positive"));
        }
        if self.init_concurrency == 0 {
            return Err(Error::config("embedding.init_concurrency must be positive"));
        }
        Ok(())
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV_VAR) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("switchboard")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific path, or defaults if it doesn't exist
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config = Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            tracing::info!(path = %path.display(), "Loaded configuration");
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create config directory: {}", dir.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.embedding.validate()?;
        self.vector.validate()?;
        self.performance.validate()?;
        self.adaptive.validate()
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        let e = &self.embedding;
        let p = &self.performance;
        let a = &self.adaptive;
        let value = match key {
            "embedding.host" => e.host.clone(),
            "embedding.model" => e.model.clone(),
            "embedding.dimension" => e.dimension.to_string(),
            "embedding.max_retries" => e.max_retries.to_string(),
            "embedding.backoff_base_ms" => e.backoff_base_ms.to_string(),
            "embedding.timeout_secs" => e.timeout_secs.to_string(),
            "embedding.cache_capacity" => e.cache_capacity.to_string(),
            "embedding.cache_ttl_secs" => e.cache_ttl_secs.to_string(),
            "embedding.init_concurrency" => e.init_concurrency.to_string(),

            "vector.similarity_threshold" => self.vector.similarity_threshold.to_string(),

            "performance.success_rate_weight" => p.success_rate_weight.to_string(),
            "performance.response_time_weight" => p.response_time_weight.to_string(),
            "performance.recent_usage_weight" => p.recent_usage_weight.to_string(),
            "performance.recent_usage_window_secs" => p.recent_usage_window_secs.to_string(),
            "performance.min_queries_for_confidence" => p.min_queries_for_confidence.to_string(),
            "performance.default_success_rate" => p.default_success_rate.to_string(),
            "performance.default_response_time" => p.default_response_time.to_string(),
            "performance.max_allowed_response_time" => p.max_allowed_response_time.to_string(),
            "performance.decay_factor" => p.decay_factor.to_string(),
            "performance.max_recent_usage" => p.max_recent_usage.to_string(),

            "adaptive.strategies" => format_strategies(&a.strategies),
            "adaptive.fallback_expert" => a.fallback_expert.to_string(),
            "adaptive.exploration_rate" => a.exploration_rate.to_string(),
            "adaptive.enable_learning" => a.enable_learning.to_string(),
            "adaptive.max_history" => a.max_history.to_string(),
            "adaptive.seed" => a
                .seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string()),

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `switchboard config list` to see available keys.",
                    key
                ));
            }
        };
        Ok(value)
    }

    /// Set a configuration value by key
    ///
    /// The change is applied to a copy and only committed if the whole
    /// configuration still validates.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut next = self.clone();
        {
            let e = &mut next.embedding;
            let p = &mut next.performance;
            let a = &mut next.adaptive;
            match key {
                "embedding.host" => e.host = value.trim().to_string(),
                "embedding.model" => e.model = value.trim().to_string(),
                "embedding.dimension" => e.dimension = parse(key, value)?,
                "embedding.max_retries" => e.max_retries = parse(key, value)?,
                "embedding.backoff_base_ms" => e.backoff_base_ms = parse(key, value)?,
                "embedding.timeout_secs" => e.timeout_secs = parse(key, value)?,
                "embedding.cache_capacity" => e.cache_capacity = parse(key, value)?,
                "embedding.cache_ttl_secs" => e.cache_ttl_secs = parse(key, value)?,
                "embedding.init_concurrency" => e.init_concurrency = parse(key, value)?,

                "vector.similarity_threshold" => {
                    next.vector.similarity_threshold = parse(key, value)?
                }

                "performance.success_rate_weight" => p.success_rate_weight = parse(key, value)?,
                "performance.response_time_weight" => p.response_time_weight = parse(key, value)?,
                "performance.recent_usage_weight" => p.recent_usage_weight = parse(key, value)?,
                "performance.recent_usage_window_secs" => {
                    p.recent_usage_window_secs = parse(key, value)?
                }
                "performance.min_queries_for_confidence" => {
                    p.min_queries_for_confidence = parse(key, value)?
                }
                "performance.default_success_rate" => p.default_success_rate = parse(key, value)?,
                "performance.default_response_time" => {
                    p.default_response_time = parse(key, value)?
                }
                "performance.max_allowed_response_time" => {
                    p.max_allowed_response_time = parse(key, value)?
                }
                "performance.decay_factor" => p.decay_factor = parse(key, value)?,
                "performance.max_recent_usage" => p.max_recent_usage = parse(key, value)?,

                "adaptive.strategies" => a.strategies = parse_strategies(value)?,
                "adaptive.fallback_expert" => a.fallback_expert = value.parse::<ExpertKind>()?,
                "adaptive.exploration_rate" => a.exploration_rate = parse(key, value)?,
                "adaptive.enable_learning" => a.enable_learning = parse(key, value)?,
                "adaptive.max_history" => a.max_history = parse(key, value)?,
                "adaptive.seed" => {
                    a.seed = match value.trim() {
                        "" | "none" => None,
                        other => Some(parse(key, other)?),
                    }
                }

                _ => {
                    return Err(anyhow!(
                        "Unknown configuration key: {}. Use `switchboard config list` to see available keys.",
                        key
                    ));
                }
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

const KEYS: &[&str] = &[
    "embedding.host",
    "embedding.model",
    "embedding.dimension",
    "embedding.max_retries",
    "embedding.backoff_base_ms",
    "embedding.timeout_secs",
    "embedding.cache_capacity",
    "embedding.cache_ttl_secs",
    "embedding.init_concurrency",
    "vector.similarity_threshold",
    "performance.success_rate_weight",
    "performance.response_time_weight",
    "performance.recent_usage_weight",
    "performance.recent_usage_window_secs",
    "performance.min_queries_for_confidence",
    "performance.default_success_rate",
    "performance.default_response_time",
    "performance.max_allowed_response_time",
    "performance.decay_factor",
    "performance.max_recent_usage",
    "adaptive.strategies",
    "adaptive.fallback_expert",
    "adaptive.exploration_rate",
    "adaptive.enable_learning",
    "adaptive.max_history",
    "adaptive.seed",
];

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid {} value '{}': {}", key, value, e))
}

/// Render strategies as `kind:weight` pairs
fn format_strategies(strategies: &[StrategyWeight]) -> String {
    strategies
        .iter()
        .map(|s| format!("{}:{}", s.kind, s.weight))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse `kind:weight` pairs, e.g. `vector:0.7,performance:0.3`
fn parse_strategies(value: &str) -> anyhow::Result<Vec<StrategyWeight>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| -> anyhow::Result<StrategyWeight> {
            let (kind, weight) = entry.split_once(':').unwrap_or((entry, "1.0"));
            let kind: StrategyKind = kind.parse()?;
            let weight: f64 = parse("adaptive.strategies", weight)?;
            Ok(StrategyWeight::new(kind, weight))
        })
        .collect()
}
