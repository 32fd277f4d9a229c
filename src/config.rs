// src/config.rs - Service configuration
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;

use crate::error::{Error, Result};

/// Main configuration structure loaded from a TOML file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub consolidation: ConsolidationConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// HTTP API bind configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Object storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory for the filesystem object store.
    #[serde(default = "default_storage_root")]
    pub root: String,
}

/// Tunables for the consolidation engine and candidate matcher.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsolidationConfig {
    /// Ceiling on the concatenated machine-code stream, in megabytes.
    /// Trailing segments are dropped, with a warning, to stay under it.
    #[serde(default = "default_size_ceiling_mb")]
    pub size_ceiling_mb: u64,

    /// Case-insensitive marker identifying operator-independent profiles.
    #[serde(default = "default_auto_profile_marker")]
    pub auto_profile_marker: String,

    /// How many unanalyzed packages are re-parsed per proposal pass to
    /// backfill missing printer identities.
    #[serde(default = "default_backfill_batch")]
    pub backfill_batch: usize,

    /// Maximum number of per-item errors reported from a batch re-analysis.
    #[serde(default = "default_error_sample_cap")]
    pub error_sample_cap: usize,
}

/// Metadata cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

/// Deadlines for remote calls and whole pipeline runs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    /// Per storage download/upload call.
    #[serde(default = "default_storage_timeout_secs")]
    pub storage_secs: u64,

    /// One whole concatenation run, end to end.
    #[serde(default = "default_merge_timeout_secs")]
    pub merge_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_storage_root() -> String {
    "packages".to_string()
}

fn default_size_ceiling_mb() -> u64 {
    500
}

fn default_auto_profile_marker() -> String {
    "auto".to_string()
}

fn default_backfill_batch() -> usize {
    5
}

fn default_error_sample_cap() -> usize {
    10
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_capacity() -> usize {
    256
}

fn default_storage_timeout_secs() -> u64 {
    30
}

fn default_merge_timeout_secs() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            size_ceiling_mb: default_size_ceiling_mb(),
            auto_profile_marker: default_auto_profile_marker(),
            backfill_batch: default_backfill_batch(),
            error_sample_cap: default_error_sample_cap(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            capacity: default_cache_capacity(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            storage_secs: default_storage_timeout_secs(),
            merge_secs: default_merge_timeout_secs(),
        }
    }
}

/// Load configuration from a TOML file.
pub fn load_config(path: &str) -> Result<Config> {
    let mut file =
        File::open(path).map_err(|e| Error::Config(format!("cannot open '{}': {}", path, e)))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| Error::Config(format!("cannot read '{}': {}", path, e)))?;
    let config: Config =
        toml::from_str(&contents).map_err(|e| Error::Config(format!("invalid TOML: {}", e)))?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.consolidation.size_ceiling_mb == 0 {
            return Err(Error::Config(
                "consolidation.size_ceiling_mb must be greater than zero".to_string(),
            ));
        }
        if self.cache.capacity == 0 {
            return Err(Error::Config(
                "cache.capacity must be greater than zero".to_string(),
            ));
        }
        if self.timeouts.storage_secs == 0 || self.timeouts.merge_secs == 0 {
            return Err(Error::Config(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Size ceiling in bytes.
    pub fn size_ceiling_bytes(&self) -> u64 {
        self.consolidation.size_ceiling_mb * 1024 * 1024
    }
}
