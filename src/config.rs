//! Operator configuration.
//!
//! Sources, lowest priority first: built-in defaults, an optional TOML file,
//! then environment variables.

use std::path::Path;
use std::time::Duration;

use redis_ctrl_core::{Error, Result};
use redis_ctrl_reconciler::{DispatchConfig, RedisConfig, ReconcilerConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub redis: RedisConfig,
    pub reconciler: ReconcilerConfig,
    pub dispatch: DispatchConfig,
}

impl OperatorConfig {
    /// Load defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::PathNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        toml::from_str(&text).map_err(|e| Error::toml_parse_failed(path, &e))
    }

    /// Override settings from environment variables read through `get`.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = get("REDIS_HOST") {
            self.redis.host = host;
        }
        if let Some(port) = get("REDIS_PORT") {
            self.redis.port = parse_env("REDIS_PORT", &port)?;
        }
        if let Some(password) = get("REDIS_PASSWORD") {
            self.redis.password = Some(password).filter(|p| !p.is_empty());
        }
        if let Some(db) = get("REDIS_DB") {
            self.redis.db = parse_env("REDIS_DB", &db)?;
        }
        if let Some(url) = get("REDIS_URL") {
            self.redis.url = Some(url).filter(|u| !u.is_empty());
        }
        if let Some(secs) = get("REQUEUE_AFTER_SECS") {
            self.reconciler.failure_requeue =
                Duration::from_secs(parse_env("REQUEUE_AFTER_SECS", &secs)?);
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| Error::invalid_env(name, format!("'{raw}': {e}")))
}
