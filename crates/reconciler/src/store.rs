//! Store client trait and implementations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::types::REASON_REDIS_ERROR;

/// Failure reported by a store client.
///
/// Store-specific error types are flattened into `detail` at the adapter
/// boundary so nothing downstream depends on a particular client library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// There is no usable client behind the adapter.
    #[error("store client unavailable: {detail}")]
    Unavailable { detail: String },

    /// The store rejected or failed the operation.
    #[error("{detail}")]
    Operation { code: String, detail: String },
}

impl StoreError {
    /// Create an unavailable error.
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::Unavailable {
            detail: detail.into(),
        }
    }

    /// Create an operation error with the default `RedisError` code.
    pub fn operation(detail: impl Into<String>) -> Self {
        Self::Operation {
            code: REASON_REDIS_ERROR.to_string(),
            detail: detail.into(),
        }
    }

    /// Create an operation error with a store-specific code.
    pub fn operation_with_code(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Operation {
            code: code.into(),
            detail: detail.into(),
        }
    }

    /// Human-readable failure detail.
    pub fn detail(&self) -> &str {
        match self {
            Self::Unavailable { detail } | Self::Operation { detail, .. } => detail,
        }
    }
}

/// Capability to write key-value pairs to the external store.
///
/// Implementations that hold a connection pool must be safe to share across
/// concurrent reconciles.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Write `value` under `key`, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// One recorded `set` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCall {
    pub key: String,
    pub value: String,
    pub ttl: Option<Duration>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    calls: Vec<SetCall>,
    pending_failures: Vec<StoreError>,
    unavailable: Option<String>,
}

/// In-memory store for tests and dry runs.
///
/// Records every write. Failures can be queued up front and are consumed
/// one per `set` call, oldest first.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<InMemoryState>,
}

impl InMemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Fail the next `set` call with `error`.
    pub async fn fail_next(&self, error: StoreError) {
        self.state.lock().await.pending_failures.push(error);
    }

    /// Report the client as unavailable until cleared.
    pub async fn set_unavailable(&self, detail: Option<String>) {
        self.state.lock().await.unavailable = detail;
    }

    /// All writes seen so far, including failed ones.
    pub async fn calls(&self) -> Vec<SetCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of writes seen so far.
    pub async fn call_count(&self) -> usize {
        self.state.lock().await.calls.len()
    }
}

#[async_trait]
impl StoreClient for InMemoryStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(detail) = &state.unavailable {
            return Err(StoreError::unavailable(detail.clone()));
        }

        state.calls.push(SetCall {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        });

        if state.pending_failures.is_empty() {
            Ok(())
        } else {
            Err(state.pending_failures.remove(0))
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        match &self.state.lock().await.unavailable {
            Some(detail) => Err(StoreError::unavailable(detail.clone())),
            None => Ok(()),
        }
    }
}

/// A wrapper that adds tracing to a store client.
pub struct TracingStore<S: StoreClient> {
    inner: S,
}

impl<S: StoreClient> TracingStore<S> {
    /// Create a new tracing store.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Get the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: StoreClient> StoreClient for TracingStore<S> {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        tracing::debug!(key, ttl_secs = ?ttl.map(|d| d.as_secs()), "Writing key");
        let result = self.inner.set(key, value, ttl).await;
        if let Err(ref e) = result {
            tracing::debug!(key, error = %e, "Write failed");
        }
        result
    }

    async fn ping(&self) -> Result<(), StoreError> {
        tracing::debug!("Pinging store");
        self.inner.ping().await
    }
}
