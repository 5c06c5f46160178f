//! Configuration management for CiteForge
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values

use crate::query::ExpansionSettings;
use crate::types::EntityType;
use crate::errors::Result;
use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Upstream metadata provider
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Entity cache used by the fetch deduplicator
    #[serde(default)]
    pub cache: CacheConfig,

    /// Node expansion defaults and per-type settings
    #[serde(default)]
    pub expansion: ExpansionConfig,

    /// Hydration sweeps
    #[serde(default)]
    pub hydration: HydrationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Contact address for the polite pool
    pub mailto: Option<String>,

    /// Premium API key
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// Outbound requests per second
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Freshness window for cached entities in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Maximum cached entries before eviction
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExpansionConfig {
    /// Related entities fetched per expansion when no limit is given
    #[serde(default = "default_expansion_limit")]
    pub default_limit: u32,

    /// Expansion depth when none is given
    #[serde(default = "default_expansion_depth")]
    pub default_depth: u32,

    /// Sort/filter settings keyed by the expanded entity type
    #[serde(default)]
    pub per_type: HashMap<EntityType, ExpansionSettings>,
}

/// Field projection used when upgrading a node to full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HydrationMode {
    /// Fetch the unrestricted entity
    Full,
    /// Fetch an entity-type-specific metadata projection
    Metadata,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HydrationConfig {
    #[serde(default = "default_hydration_mode")]
    pub mode: HydrationMode,

    /// Delay between nodes in a paced sweep (milliseconds)
    #[serde(default = "default_sweep_delay")]
    pub sweep_delay_ms: u64,

    /// Nodes per batch in a paced sweep
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,

    /// Pause after each batch in a paced sweep (milliseconds)
    #[serde(default = "default_sweep_batch_pause")]
    pub sweep_batch_pause_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_base_url() -> String { "https://api.openalex.org".to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_requests_per_second() -> u32 { 10 }
fn default_cache_ttl() -> u64 { 300 }
fn default_cache_max_entries() -> usize { 10_000 }
fn default_expansion_limit() -> u32 { 25 }
fn default_expansion_depth() -> u32 { 1 }
fn default_hydration_mode() -> HydrationMode { HydrationMode::Full }
fn default_sweep_delay() -> u64 { 100 }
fn default_sweep_batch_size() -> usize { 10 }
fn default_sweep_batch_pause() -> u64 { 1_000 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { false }
fn default_metrics_port() -> u16 { 0 }
fn default_service_name() -> String { "citeforge".to_string() }

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            mailto: None,
            api_key: None,
            timeout_secs: default_request_timeout(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            default_limit: default_expansion_limit(),
            default_depth: default_expansion_depth(),
            per_type: HashMap::new(),
        }
    }
}

impl Default for HydrationConfig {
    fn default() -> Self {
        Self {
            mode: default_hydration_mode(),
            sweep_delay_ms: default_sweep_delay(),
            sweep_batch_size: default_sweep_batch_size(),
            sweep_batch_pause_ms: default_sweep_batch_pause(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false));

        Self::build(builder)
    }

    /// Load from a specific file, still honouring `APP__` overrides
    pub fn from_file(path: &str) -> Result<Self> {
        Self::build(Config::builder().add_source(File::with_name(path)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config = builder
            // Load from environment variables with APP__ prefix
            // e.g., APP__PROVIDER__MAILTO=me@example.org
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Expansion settings for a type, falling back to the default limit
    pub fn expansion_settings(&self, entity_type: EntityType) -> ExpansionSettings {
        let mut settings = self
            .expansion
            .per_type
            .get(&entity_type)
            .cloned()
            .unwrap_or_default();
        if settings.limit.is_none() {
            settings.limit = Some(self.expansion.default_limit);
        }
        settings
    }
}

impl CacheConfig {
    /// Freshness window as a Duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl HydrationConfig {
    pub fn sweep_delay(&self) -> Duration {
        Duration::from_millis(self.sweep_delay_ms)
    }

    pub fn sweep_batch_pause(&self) -> Duration {
        Duration::from_millis(self.sweep_batch_pause_ms)
    }
}
