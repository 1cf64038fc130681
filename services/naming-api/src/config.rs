//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The admin token is loaded from the NAMING_ADMIN_TOKEN env var or
//! admin_token_file, never stored in the TOML directly to avoid leaking
//! secrets. Without a token the admin API stays disabled.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub fast: FastConfig,
    pub slow: SlowConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub usage: UsageConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Fast path: local snapshot plus optional remote database lookup
#[derive(Debug, Deserialize)]
pub struct FastConfig {
    /// Base URL of the remote structured database. Absent means local-only.
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default = "default_remote_timeout")]
    pub remote_timeout_secs: u64,
    /// TSV snapshot loaded in the background at startup.
    #[serde(default)]
    pub local_lookup_path: Option<PathBuf>,
    #[serde(default = "default_fast_workers")]
    pub workers: usize,
}

/// Slow path: inference engine sidecar
#[derive(Debug, Deserialize)]
pub struct SlowConfig {
    pub engine_url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Deserialize)]
pub struct UsageConfig {
    /// Emit a full per-item usage record every Nth batch.
    #[serde(default = "default_sample_every")]
    pub sample_every: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminConfig {
    #[serde(skip)]
    pub token: Option<Secret<String>>,
    /// Path to a file containing the bearer token (alternative to the
    /// NAMING_ADMIN_TOKEN env var)
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

fn default_max_connections() -> usize {
    1000
}

fn default_remote_timeout() -> u64 {
    5
}

fn default_fast_workers() -> usize {
    4
}

fn default_pool_size() -> usize {
    4
}

fn default_cache_capacity() -> usize {
    10_000
}

fn default_sample_every() -> u64 {
    10
}

impl Default for FastConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            remote_timeout_secs: default_remote_timeout(),
            local_lookup_path: None,
            workers: default_fast_workers(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            sample_every: default_sample_every(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Admin token resolution order:
    /// 1. NAMING_ADMIN_TOKEN env var
    /// 2. admin.token_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Some(ref url) = config.fast.remote_url
            && !url.starts_with("http://")
            && !url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "fast.remote_url must start with http:// or https://, got: {url}"
            )));
        }

        if !config.slow.engine_url.starts_with("http://")
            && !config.slow.engine_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "slow.engine_url must start with http:// or https://, got: {}",
                config.slow.engine_url
            )));
        }

        if config.fast.remote_timeout_secs == 0 {
            return Err(common::Error::Config(
                "fast.remote_timeout_secs must be greater than 0".into(),
            ));
        }

        if config.slow.pool_size == 0 {
            return Err(common::Error::Config(
                "slow.pool_size must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "server.max_connections must be greater than 0".into(),
            ));
        }

        if config.usage.sample_every == 0 {
            return Err(common::Error::Config(
                "usage.sample_every must be greater than 0".into(),
            ));
        }

        // Resolve admin token: env var takes precedence over file
        if let Ok(token) = std::env::var("NAMING_ADMIN_TOKEN") {
            config.admin.token = Some(Secret::new(token));
        } else if let Some(ref token_file) = config.admin.token_file {
            let token = std::fs::read_to_string(token_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read admin.token_file {}: {e}",
                    token_file.display()
                ))
            })?;
            let token = token.trim().to_owned();
            if !token.is_empty() {
                config.admin.token = Some(Secret::new(token));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("naming-api.toml")
    }
}
