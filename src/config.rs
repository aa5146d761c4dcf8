//! Configuration surface.
//!
//! Every field has a default, so a partial YAML file (or none at all) is valid:
//!
//! ```yaml
//! default_region: eu-west-1
//! cache:
//!   ttl_minutes: 10
//! max_concurrency: 4
//! rate_limit:
//!   per_second: 5
//!   burst: 10
//! global_dedup: lowest_region
//! ```

use crate::engine::{normalize_concurrency, GlobalDedup};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Region preselected by the presentation layer.
    pub default_region: String,
    /// Service preselected by the presentation layer.
    pub default_service: String,
    pub server: ServerConfig,
    pub cache: CacheConfig,
    /// Simultaneous region fetches; zero or negative means 10.
    pub max_concurrency: i64,
    pub rate_limit: RateLimitConfig,
    pub global_dedup: GlobalDedup,
    /// When non-empty, "all regions" means these instead of every enabled region.
    pub regions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_minutes: u64,
    pub sweep_interval_secs: u64,
}

/// Token bucket guarding the quota listing API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Refill rate in tokens per second.
    pub per_second: f64,
    /// Bucket capacity.
    pub burst: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_region: "us-east-1".to_string(),
            default_service: "ec2".to_string(),
            server: ServerConfig::default(),
            cache: CacheConfig::default(),
            max_concurrency: 10,
            rate_limit: RateLimitConfig::default(),
            global_dedup: GlobalDedup::default(),
            regions: Vec::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: "8080".to_string() }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_minutes: 5, sweep_interval_secs: 60 }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { per_second: 5.0, burst: 10 }
    }
}

impl Config {
    /// Parse and validate YAML. An empty document yields the defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config =
            if yaml.trim().is_empty() { Config::default() } else { serde_yaml::from_str(yaml)? };
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_yaml_str(&contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(target: "quotascope::config", path = %path.display(), "config file not found; using defaults");
                Ok(Config::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.ttl_minutes == 0 {
            return Err(invalid("cache.ttl_minutes", "must be at least 1"));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(invalid("cache.sweep_interval_secs", "must be at least 1"));
        }
        if !self.rate_limit.per_second.is_finite() || self.rate_limit.per_second <= 0.0 {
            return Err(invalid(
                "rate_limit.per_second",
                format!("must be a positive number, got {}", self.rate_limit.per_second),
            ));
        }
        if self.rate_limit.burst == 0 {
            return Err(invalid("rate_limit.burst", "must be at least 1"));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_minutes.saturating_mul(60))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_secs)
    }

    /// Concurrency cap with the non-positive fallback applied.
    pub fn concurrency(&self) -> usize {
        normalize_concurrency(usize::try_from(self.max_concurrency).unwrap_or(0))
    }

    /// Listening port; the `PORT` environment variable wins when set.
    pub fn port(&self) -> String {
        self.port_with(std::env::var("PORT").ok().as_deref())
    }

    fn port_with(&self, env_port: Option<&str>) -> String {
        match env_port {
            Some(port) if !port.is_empty() => port.to_string(),
            _ => self.server.port.clone(),
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field, reason: reason.into() }
}
