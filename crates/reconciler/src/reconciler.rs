//! Reconciler implementation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use redis_ctrl_core::ResultExt;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

use crate::api::EntryApi;
use crate::error::{Error, Result, Stage};
use crate::store::{StoreClient, StoreError};
use crate::types::{
    Action, ConditionStatus, EntryId, MESSAGE_SUCCESS, ObservedStatus, REASON_CLIENT_UNINITIALIZED,
    REASON_SUCCESS, RedisEntry, TYPE_AVAILABLE, TYPE_ERROR,
};

/// Longest accepted per-pass time budget.
pub const MAX_CALL_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Requeue delay after a failed or impossible store write.
    #[serde(with = "duration_secs")]
    pub failure_requeue: Duration,
    /// Requeue delay after a failed status update.
    #[serde(with = "duration_secs")]
    pub status_requeue: Duration,
    /// Time budget for one pass when no deadline is given.
    #[serde(with = "duration_secs")]
    pub call_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            failure_requeue: Duration::from_secs(5),
            status_requeue: Duration::from_secs(1),
            call_timeout: Duration::from_secs(10),
        }
    }
}

impl ReconcilerConfig {
    /// Reject settings that would spin or never finish.
    pub fn validate(&self) -> Result<()> {
        if self.failure_requeue.is_zero() {
            return Err(Error::invalid_config("failure_requeue must be positive"));
        }
        if self.status_requeue.is_zero() {
            return Err(Error::invalid_config("status_requeue must be positive"));
        }
        if self.call_timeout.is_zero() {
            return Err(Error::invalid_config("call_timeout must be positive"));
        }
        if self.call_timeout > MAX_CALL_TIMEOUT {
            return Err(Error::invalid_config(format!(
                "call_timeout must be at most {}s",
                MAX_CALL_TIMEOUT.as_secs()
            )));
        }
        Ok(())
    }
}

/// Drives one declared entry toward the store and records the outcome.
///
/// Holds no per-entry state, so one instance can serve concurrent passes
/// for different identities.
pub struct Reconciler {
    api: Arc<dyn EntryApi>,
    store: Arc<dyn StoreClient>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        api: Arc<dyn EntryApi>,
        store: Arc<dyn StoreClient>,
        config: ReconcilerConfig,
    ) -> Self {
        Self { api, store, config }
    }

    /// Reconcile `id` within the configured call timeout.
    pub async fn reconcile(&self, id: &EntryId) -> Result<Action> {
        let deadline = Instant::now()
            .checked_add(self.config.call_timeout)
            .ok_or_else(|| Error::invalid_config("call_timeout overflows the clock"))?;
        self.reconcile_until(id, deadline).await
    }

    /// Reconcile `id`, giving up at `deadline`.
    ///
    /// The store write always happens before the status write. When the
    /// deadline expires during the store write, nothing is persisted because
    /// the outcome of the write is unknown.
    pub async fn reconcile_until(&self, id: &EntryId, deadline: Instant) -> Result<Action> {
        info!(%id, "Starting reconciliation");

        let entry = match self.fetch(id, deadline).await? {
            Some(entry) => entry,
            None => {
                info!(%id, "Entry not found, assuming it was deleted");
                return Ok(Action::await_change());
            }
        };

        let RedisEntry {
            spec, mut status, ..
        } = entry;
        let ttl = spec.effective_ttl();
        debug!(%id, key = %spec.key, ttl_secs = ?ttl.map(|d| d.as_secs()), "Applying entry");

        let write = timeout_at(deadline, self.store.set(&spec.key, &spec.value, ttl))
            .await
            .map_err(|_| Error::deadline_exceeded(id, Stage::StoreWrite))
            .tap_err(|e| warn!(%id, error = %e, "Store write timed out"))?;

        let now = Utc::now();
        let outcome = match write {
            Ok(()) => {
                status.conditions.upsert(
                    TYPE_AVAILABLE,
                    ConditionStatus::True,
                    REASON_SUCCESS,
                    MESSAGE_SUCCESS,
                    now,
                );
                status.record_applied(&spec.value, now);
                Ok(Action::await_change())
            }
            Err(StoreError::Unavailable { detail }) => {
                warn!(%id, detail = %detail, "Store client unavailable");
                status.conditions.upsert(
                    TYPE_ERROR,
                    ConditionStatus::True,
                    REASON_CLIENT_UNINITIALIZED,
                    &detail,
                    now,
                );
                Ok(Action::requeue(self.config.failure_requeue))
            }
            Err(StoreError::Operation { code, detail }) => {
                error!(%id, key = %spec.key, error = %detail, "Failed to set key");
                status
                    .conditions
                    .upsert(TYPE_ERROR, ConditionStatus::True, &code, &detail, now);
                Err(Error::StoreWrite {
                    key: spec.key.clone(),
                    code,
                    detail,
                    retry_after: self.config.failure_requeue,
                })
            }
        };

        match (self.persist(id, &status, deadline).await, outcome) {
            // the store failure is the more specific explanation
            (Err(persist), Err(store)) => {
                warn!(%id, error = %persist, "Status not saved after store failure");
                Err(store)
            }
            (Err(persist), Ok(_)) => Err(persist),
            (Ok(()), Ok(action)) => {
                if action.requeue_after.is_none() {
                    info!(%id, key = %spec.key, "Successfully reconciled entry");
                }
                Ok(action)
            }
            (Ok(()), Err(store)) => Err(store),
        }
    }

    /// Fetch the entry, mapping deletion to `None`.
    async fn fetch(&self, id: &EntryId, deadline: Instant) -> Result<Option<RedisEntry>> {
        match timeout_at(deadline, self.api.get(id)).await {
            Err(_) => Err(Error::deadline_exceeded(id, Stage::Lookup)),
            Ok(Ok(entry)) => Ok(Some(entry)),
            Ok(Err(e)) if e.is_not_found() => Ok(None),
            Ok(Err(e)) => {
                error!(%id, error = %e, "Failed to fetch entry");
                Err(Error::lookup(id, e.to_string()))
            }
        }
    }

    async fn persist(&self, id: &EntryId, status: &ObservedStatus, deadline: Instant) -> Result<()> {
        match timeout_at(deadline, self.api.update_status(id, status)).await {
            Err(_) => Err(Error::deadline_exceeded(id, Stage::StatusUpdate)),
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(%id, error = %e, "Failed to update entry status");
                Err(Error::status_persistence(
                    id,
                    e.to_string(),
                    self.config.status_requeue,
                ))
            }
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    api: Option<Arc<dyn EntryApi>>,
    store: Option<Arc<dyn StoreClient>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            api: None,
            store: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the entry API.
    #[must_use]
    pub fn with_api(mut self, api: Arc<dyn EntryApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Set the store client.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn StoreClient>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the requeue delay used after store failures.
    #[must_use]
    pub const fn failure_requeue(mut self, delay: Duration) -> Self {
        self.config.failure_requeue = delay;
        self
    }

    /// Build the reconciler.
    pub fn build(self) -> Result<Reconciler> {
        let api = self
            .api
            .ok_or_else(|| Error::invalid_config("entry API is required"))?;
        let store = self
            .store
            .ok_or_else(|| Error::invalid_config("store client is required"))?;
        self.config.validate()?;

        Ok(Reconciler::new(api, store, self.config))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
