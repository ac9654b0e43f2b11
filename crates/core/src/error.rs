//! Core error types for loading configuration and entry manifests.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type for redis-ctrl startup operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    #[error("path does not exist: {path}")]
    PathNotFound { path: PathBuf },

    #[error("YAML parse error in '{path}': {reason}")]
    YamlParseFailed { path: PathBuf, reason: String },

    #[error("TOML parse error in '{path}': {reason}")]
    TomlParseFailed { path: PathBuf, reason: String },

    #[error("invalid value for {name}: {reason}")]
    InvalidEnv { name: String, reason: String },

    #[error("invalid entry '{entry}': {reason}")]
    InvalidEntry { entry: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a YAML parse error.
    pub fn yaml_parse_failed(path: impl Into<PathBuf>, err: &serde_yaml::Error) -> Self {
        Self::YamlParseFailed {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Create a TOML parse error.
    pub fn toml_parse_failed(path: impl Into<PathBuf>, err: &toml::de::Error) -> Self {
        Self::TomlParseFailed {
            path: path.into(),
            reason: err.message().to_string(),
        }
    }

    /// Create an invalid environment variable error.
    pub fn invalid_env(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEnv {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid entry error.
    pub fn invalid_entry(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEntry {
            entry: entry.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_entry_display() {
        let err = Error::invalid_entry("default/cache", "key must not be empty");
        let text = err.to_string();
        assert!(text.contains("default/cache"));
        assert!(text.contains("key must not be empty"));
    }

    #[test]
    fn test_invalid_env_display() {
        let err = Error::invalid_env("REDIS_PORT", "not a number");
        assert_eq!(err.to_string(), "invalid value for REDIS_PORT: not a number");
    }
}
