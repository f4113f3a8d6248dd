//! Application configuration.
//!
//! Aggregates configuration from all components into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod delivery;
mod inbound;
mod registry;

use std::time::Duration;

use serde::Deserialize;

pub use delivery::DeliveryConfig;
pub use inbound::InboundConfig;
pub use registry::RegistryConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "webhook.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "WEBHOOK_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "WEBHOOK";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "WEBHOOK_LOG";
/// Environment variable for database URL.
pub const DATABASE_URL_ENV_VAR: &str = "DATABASE_URL";

/// Default subscription cache TTL (10 minutes).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 600;
/// Default per-batch deadline.
pub const DEFAULT_PIPELINE_DEADLINE_SECS: u64 = 60;

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deployment environment name (e.g. `dev`, `prod`).
    pub environment: String,
    /// Log output configuration.
    pub logging: LoggingConfig,
    /// Inbound queue configuration.
    pub inbound: InboundConfig,
    /// Subscription registry configuration.
    pub registry: RegistryConfig,
    /// Subscription cache configuration.
    pub cache: CacheConfig,
    /// Webhook delivery configuration.
    pub delivery: DeliveryConfig,
    /// Batch processing configuration.
    pub pipeline: PipelineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "dev".to_string(),
            logging: LoggingConfig::default(),
            inbound: InboundConfig::default(),
            registry: RegistryConfig::default(),
            cache: CacheConfig::default(),
            delivery: DeliveryConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

/// Subscription cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum age of a cached subscriber snapshot, in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Batch processing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on processing one batch, in seconds.
    pub deadline_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            deadline_secs: DEFAULT_PIPELINE_DEADLINE_SECS,
        }
    }
}

impl PipelineConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `webhook.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    ///
    /// `DATABASE_URL` fills in the registry URL when no source sets it.
    pub fn load(path: Option<&str>) -> Result<Self, ::config::ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = config.try_deserialize()?;

        if config.registry.database_url.is_empty() {
            if let Ok(url) = std::env::var(DATABASE_URL_ENV_VAR) {
                config.registry.database_url = url;
            }
        }

        Ok(config)
    }
}
