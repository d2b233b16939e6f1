//! Application settings and configuration management

use crate::backend::BackendKind;
use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub rate_limit: RateLimitConfig,
    pub storage: StorageConfig,
    pub store: StoreConfig,
    pub arena: ArenaConfig,
    pub autogen: AutogenConfig,
    #[serde(default)]
    pub selection: SelectionKind,
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Inbound rate limiting for generation requests
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst_size: u32,
}

fn default_rps() -> u32 {
    2
}

fn default_burst() -> u32 {
    10
}

/// Image file storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub base_path: String,
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
}

fn default_storage_path() -> String {
    "./generated_images".to_string()
}

fn default_url_prefix() -> String {
    "http://localhost:8080/images".to_string()
}

/// Key-value store connection. Without a Redis URL an in-process store is
/// used, which does not coordinate across instances.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// How often the in-process store drops expired keys
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_pool_size() -> u32 {
    16
}

fn default_sweep_interval() -> u64 {
    60
}

/// Pair and vote retention settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArenaConfig {
    #[serde(default = "default_viewed_ttl")]
    pub viewed_ttl_secs: u64,
    #[serde(default = "default_vote_log_limit")]
    pub vote_log_limit: usize,
    #[serde(default = "default_vote_ttl")]
    pub vote_record_ttl_secs: u64,
}

fn default_viewed_ttl() -> u64 {
    24 * 60 * 60
}

fn default_vote_log_limit() -> usize {
    10_000
}

fn default_vote_ttl() -> u64 {
    30 * 24 * 60 * 60
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            viewed_ttl_secs: default_viewed_ttl(),
            vote_log_limit: default_vote_log_limit(),
            vote_record_ttl_secs: default_vote_ttl(),
        }
    }
}

/// Background pair generation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutogenConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_autogen_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_max_jitter")]
    pub max_jitter_secs: u64,
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,
    #[serde(default = "default_prompts")]
    pub prompts: Vec<String>,
}

fn default_autogen_interval() -> u64 {
    3600
}

fn default_max_jitter() -> u64 {
    30
}

fn default_lock_ttl() -> u64 {
    600
}

fn default_prompts() -> Vec<String> {
    [
        "A lighthouse on a cliff during a thunderstorm",
        "A robot holding a red skateboard",
        "A cozy reading nook in a treehouse",
        "A watercolor fox in a snowy forest",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Strategy used to order candidate providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    #[default]
    UniformRandom,
    LeastErrorsFirst,
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new("freepik", BackendKind::Freepik),
        ProviderConfig::new("google-imagen", BackendKind::GoogleImagen),
        ProviderConfig::new("leonardo-ai", BackendKind::LeonardoAi),
    ]
}

/// Provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: BackendKind,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key; defaults per kind
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_timeout() -> u64 {
    60000
}

fn default_poll_interval() -> u64 {
    5000
}

fn default_max_poll_attempts() -> u32 {
    24
}

impl ProviderConfig {
    /// Provider entry with default tuning
    pub fn new(name: impl Into<String>, kind: BackendKind) -> Self {
        Self {
            name: name.into(),
            kind,
            base_url: None,
            api_key_env: None,
            api_key: None,
            model: None,
            timeout_ms: default_timeout(),
            poll_interval_ms: default_poll_interval(),
            max_poll_attempts: default_max_poll_attempts(),
            enabled: true,
        }
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::Config(config::ConfigError::Message(message.into()))
}

impl Settings {
    /// Load settings from `IMAGE_ARENA_CONFIG` (or `config/default.toml`)
    /// and environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var("IMAGE_ARENA_CONFIG").unwrap_or_else(|_| "config/default".to_string());
        Self::load_from_path(path)
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_string_lossy().to_string();
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            .set_default("rate_limit.enabled", true)?
            .set_default("storage.base_path", default_storage_path())?
            .set_default("store.pool_size", i64::from(default_pool_size()))?
            .set_default("store.sweep_interval_secs", default_sweep_interval() as i64)?
            .set_default("storage.url_prefix", default_url_prefix())?
            .set_default("arena.vote_log_limit", default_vote_log_limit() as i64)?
            .set_default("autogen.enabled", false)?
            .add_source(File::with_name(&path).required(false))
            // Override with environment variables (prefixed with IMAGE_ARENA__)
            .add_source(
                Environment::with_prefix("IMAGE_ARENA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0"));
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err(invalid(format!(
                "Invalid log format '{}'. Must be 'json' or 'pretty'",
                self.logging.format
            )));
        }

        if self.arena.vote_log_limit == 0 {
            return Err(invalid("arena.vote_log_limit must be positive"));
        }

        if self.store.pool_size == 0 {
            return Err(invalid("store.pool_size must be positive"));
        }

        if self.store.sweep_interval_secs == 0 {
            return Err(invalid("store.sweep_interval_secs must be positive"));
        }

        if self.autogen.enabled {
            if self.autogen.prompts.is_empty() {
                return Err(invalid("autogen is enabled but no prompts are configured"));
            }
            if let Some(index) = self.autogen.prompts.iter().position(|p| p.trim().is_empty()) {
                return Err(invalid(format!("autogen.prompts[{}] is blank", index)));
            }
            if self.autogen.interval_secs == 0 || self.autogen.lock_ttl_secs == 0 {
                return Err(invalid("autogen interval and lock TTL must be positive"));
            }
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(invalid("Provider name cannot be empty"));
            }
            if !names.insert(provider.name.as_str()) {
                return Err(invalid(format!("Duplicate provider name '{}'", provider.name)));
            }
            if provider.max_poll_attempts == 0 {
                return Err(invalid(format!(
                    "Provider '{}' must allow at least one poll attempt",
                    provider.name
                )));
            }
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                requests_per_second: default_rps(),
                burst_size: default_burst(),
            },
            storage: StorageConfig {
                base_path: default_storage_path(),
                url_prefix: default_url_prefix(),
            },
            store: StoreConfig {
                redis_url: None,
                pool_size: default_pool_size(),
                sweep_interval_secs: default_sweep_interval(),
            },
            arena: ArenaConfig::default(),
            autogen: AutogenConfig {
                enabled: false,
                interval_secs: default_autogen_interval(),
                max_jitter_secs: default_max_jitter(),
                lock_ttl_secs: default_lock_ttl(),
                prompts: default_prompts(),
            },
            selection: SelectionKind::default(),
            providers: default_providers(),
        }
    }
}
