//! Config struct and loading logic.
//!
//! Priority (highest to lowest):
//! 1. Environment variables (`KRITIQ_*`, provider API key vars)
//! 2. `.kritiq.toml` in the working directory
//! 3. `~/.config/kritiq/config.toml` (global defaults)
//! 4. Built-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::breaker::BreakerConfig;
use crate::constants;
use crate::env::Env;
use crate::models::ProviderName;
use crate::pipeline::PipelineConfig;

/// Errors during config loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineSettings,
    pub cache: CacheSettings,
    pub breaker: BreakerSettings,
    pub provider: ProviderConfig,
    pub store: StoreSettings,
    pub notify: NotifySettings,
    pub telemetry: TelemetrySettings,
}

/// Pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub upstream_timeout_secs: u64,
    pub store_timeout_secs: u64,
    pub batch_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            upstream_timeout_secs: constants::DEFAULT_UPSTREAM_TIMEOUT_SECS,
            store_timeout_secs: constants::DEFAULT_STORE_TIMEOUT_SECS,
            batch_concurrency: constants::DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

/// Result cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub fallback_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: constants::DEFAULT_CACHE_TTL_SECS,
            fallback_ttl_secs: constants::DEFAULT_FALLBACK_TTL_SECS,
        }
    }
}

/// Circuit breaker tuning. Uniform across services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub max_errors: usize,
    pub reset_window_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            max_errors: constants::DEFAULT_BREAKER_MAX_ERRORS,
            reset_window_secs: constants::DEFAULT_BREAKER_RESET_WINDOW_SECS,
        }
    }
}

/// LLM provider configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: ProviderName,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: ProviderName::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

/// Durable store location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Directory for the file store. `None` uses the default under
    /// `~/.config/kritiq/store/`.
    pub dir: Option<PathBuf>,
}

/// Notification delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    /// Endpoint for lifecycle event POSTs. `None` disables delivery.
    pub webhook_url: Option<String>,
}

/// Logging/telemetry toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// File overlay: only the sections a file actually sets.
#[derive(Default, Deserialize)]
struct PartialConfig {
    pipeline: Option<PipelineSettings>,
    cache: Option<CacheSettings>,
    breaker: Option<BreakerSettings>,
    provider: Option<ProviderConfig>,
    store: Option<StoreSettings>,
    notify: Option<NotifySettings>,
    telemetry: Option<TelemetrySettings>,
}

impl Config {
    /// Load configuration with proper layering.
    ///
    /// Reads the global config, then the working-directory config,
    /// then applies environment variable overrides.
    pub fn load(working_dir: Option<&Path>, env: &Env) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                config = Self::merge_file(config, &global_path)?;
            }
        }

        if let Some(dir) = working_dir {
            let local_path = dir.join(constants::CONFIG_FILENAME);
            if local_path.exists() {
                config = Self::merge_file(config, &local_path)?;
            }
        }

        config.apply_env(env);
        Ok(config)
    }

    /// Path of the global config file, if a config dir exists.
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(constants::CONFIG_DIR).join("config.toml"))
    }

    fn merge_file(mut base: Config, path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let overlay: PartialConfig =
            toml::from_str(&content).map_err(|source| ConfigError::ParseFile {
                path: path.to_path_buf(),
                source,
            })?;
        // Whole-section replacement keeps merging predictable: a file
        // that sets any key in a section owns that section.
        if let Some(pipeline) = overlay.pipeline {
            base.pipeline = pipeline;
        }
        if let Some(cache) = overlay.cache {
            base.cache = cache;
        }
        if let Some(breaker) = overlay.breaker {
            base.breaker = breaker;
        }
        if let Some(provider) = overlay.provider {
            base.provider = provider;
        }
        if let Some(store) = overlay.store {
            base.store = store;
        }
        if let Some(notify) = overlay.notify {
            base.notify = notify;
        }
        if let Some(telemetry) = overlay.telemetry {
            base.telemetry = telemetry;
        }
        Ok(base)
    }

    /// Apply environment overrides on top of the loaded layers.
    fn apply_env(&mut self, env: &Env) {
        if let Some(name) = env.non_empty(constants::ENV_PROVIDER) {
            if let Ok(parsed) = name.parse::<ProviderName>() {
                self.provider.name = parsed;
            }
        }
        if let Some(model) = env.non_empty(constants::ENV_MODEL) {
            self.provider.model = model;
        }
        if let Some(base_url) = env.non_empty(constants::ENV_BASE_URL) {
            self.provider.base_url = Some(base_url);
        }
        if let Some(key) = env
            .non_empty(constants::ENV_API_KEY)
            .or_else(|| env.non_empty(self.provider.name.api_key_env_var()))
        {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = env.non_empty(constants::ENV_WEBHOOK_URL) {
            self.notify.webhook_url = Some(url);
        }
        if let Some(dir) = env.non_empty(constants::ENV_STORE_DIR) {
            self.store.dir = Some(PathBuf::from(dir));
        }
    }

    /// Pipeline tuning as the pipeline consumes it.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            upstream_timeout: Duration::from_secs(self.pipeline.upstream_timeout_secs),
            store_timeout: Duration::from_secs(self.pipeline.store_timeout_secs),
            recent_max_age_millis: constants::RECENT_ANALYSIS_MAX_AGE_MS,
            fallback_ttl: Duration::from_secs(self.cache.fallback_ttl_secs),
            batch_concurrency: self.pipeline.batch_concurrency,
        }
    }

    /// Breaker tuning as the breaker consumes it.
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            max_errors: self.breaker.max_errors,
            reset_window: Duration::from_secs(self.breaker.reset_window_secs),
        }
    }

    /// Default cache TTL.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}
