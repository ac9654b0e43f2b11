//! Redis-backed store client.
//!
//! Connections come from a `deadpool-redis` pool. Creating the pool does not
//! connect; call [`StoreClient::ping`] once at startup to check readiness.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Connection, Pool, PoolError, Runtime};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::{StoreClient, StoreError};

/// Connection settings for the Redis store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u32,
    /// Full connection URL. Overrides host, port, password and db.
    pub url: Option<String>,
    pub pool_size: usize,
    /// Timeout for acquiring and creating connections, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "redis-redis-service".to_string(),
            port: 6379,
            password: None,
            db: 0,
            url: None,
            pool_size: 16,
            timeout_ms: 5_000,
        }
    }
}

impl RedisConfig {
    /// Connection URL derived from the settings.
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!(
                "redis://:{password}@{}:{}/{}",
                self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    /// Connection URL with any password masked, for logging.
    pub fn redacted_url(&self) -> String {
        let url = self.connection_url();
        match (url.find("://"), url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => format!(
                "{}://***{}",
                url.get(..scheme_end).unwrap_or("redis"),
                url.get(at..).unwrap_or("")
            ),
            _ => url,
        }
    }
}

/// Store client backed by a Redis connection pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Build a pool from `config`.
    pub fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let mut pool_config = deadpool_redis::Config::from_url(config.connection_url());
        let mut settings = pool_config.get_pool_config();
        settings.max_size = config.pool_size;
        settings.timeouts.wait = Some(timeout);
        settings.timeouts.create = Some(timeout);
        settings.timeouts.recycle = Some(timeout);
        pool_config.pool = Some(settings);

        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::unavailable(e.to_string()))?;

        info!(url = %config.redacted_url(), "Redis pool created");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    async fn connection(&self) -> Result<Connection, StoreError> {
        self.pool.get().await.map_err(pool_error)
    }
}

fn pool_error(err: PoolError) -> StoreError {
    match err {
        PoolError::Closed | PoolError::NoRuntimeSpecified => {
            StoreError::unavailable(err.to_string())
        }
        other => StoreError::operation(other.to_string()),
    }
}

fn redis_error(err: &deadpool_redis::redis::RedisError) -> StoreError {
    StoreError::operation(err.to_string())
}

#[async_trait]
impl StoreClient for RedisStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl.as_secs())
                .await
                .map_err(|e| redis_error(&e)),
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|e| redis_error(&e)),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _pong: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error(&e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_url() {
        let config = RedisConfig::default();
        assert_eq!(config.connection_url(), "redis://redis-redis-service:6379/0");
    }

    #[test]
    fn test_password_in_url_is_redacted() {
        let config = RedisConfig {
            password: Some("hunter2".into()),
            ..RedisConfig::default()
        };
        assert_eq!(
            config.connection_url(),
            "redis://:hunter2@redis-redis-service:6379/0"
        );
        assert_eq!(config.redacted_url(), "redis://***@redis-redis-service:6379/0");
    }

    #[test]
    fn test_explicit_url_wins() {
        let config = RedisConfig {
            url: Some("redis://localhost:6380/2".into()),
            ..RedisConfig::default()
        };
        assert_eq!(config.connection_url(), "redis://localhost:6380/2");
    }

    #[test]
    fn test_closed_pool_maps_to_unavailable() {
        assert!(matches!(
            pool_error(PoolError::Closed),
            StoreError::Unavailable { .. }
        ));
    }

    #[tokio::test]
    async fn test_connect_does_not_dial() {
        let store = RedisStore::connect(&RedisConfig::default());
        assert!(store.is_ok());
    }
}
