//! Access to declared entries and their status.
//!
//! The control plane that owns entry objects is an external collaborator.
//! The reconciler reads specs and writes status only through [`EntryApi`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::types::{DesiredEntry, EntryId, ObservedStatus, RedisEntry};

/// Failure reported by the entry API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("entry '{id}' not found")]
    NotFound { id: EntryId },

    #[error("entry API unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("conflict on entry '{id}': {reason}")]
    Conflict { id: EntryId, reason: String },
}

impl ApiError {
    /// Create a not found error.
    pub fn not_found(id: &EntryId) -> Self {
        Self::NotFound { id: id.clone() }
    }

    /// Create an unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Whether the entry no longer exists.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Read specs and persist status for declared entries.
#[async_trait]
pub trait EntryApi: Send + Sync {
    /// Fetch the current entry for `id`.
    async fn get(&self, id: &EntryId) -> Result<RedisEntry, ApiError>;

    /// Replace the status of `id`.
    async fn update_status(&self, id: &EntryId, status: &ObservedStatus) -> Result<(), ApiError>;
}

#[derive(Debug, Default)]
struct Faults {
    failing_status_updates: usize,
    failing_gets: usize,
}

/// In-memory entry API.
///
/// Hosts entries loaded from manifests in the binary, and stands in for the
/// control plane in tests.
#[derive(Debug, Default)]
pub struct InMemoryEntryApi {
    entries: RwLock<HashMap<EntryId, RedisEntry>>,
    faults: RwLock<Faults>,
}

impl InMemoryEntryApi {
    /// Create an empty API.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty API wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Create or replace the spec of `id`, keeping any existing status.
    pub async fn apply(&self, id: EntryId, spec: DesiredEntry) {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&id) {
            Some(existing) => existing.spec = spec,
            None => {
                entries.insert(id.clone(), RedisEntry::new(id, spec));
            }
        }
    }

    /// Delete `id` along with its status.
    pub async fn delete(&self, id: &EntryId) -> Option<RedisEntry> {
        self.entries.write().await.remove(id)
    }

    /// Identities of all entries, sorted.
    pub async fn list_ids(&self) -> Vec<EntryId> {
        let mut ids: Vec<EntryId> = self.entries.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Current status of `id`, if the entry exists.
    pub async fn status(&self, id: &EntryId) -> Option<ObservedStatus> {
        self.entries
            .read()
            .await
            .get(id)
            .map(|entry| entry.status.clone())
    }

    /// Fail the next `n` status updates.
    pub async fn fail_next_status_updates(&self, n: usize) {
        self.faults.write().await.failing_status_updates = n;
    }

    /// Fail the next `n` lookups with an unavailable error.
    pub async fn fail_next_gets(&self, n: usize) {
        self.faults.write().await.failing_gets = n;
    }
}

#[async_trait]
impl EntryApi for InMemoryEntryApi {
    async fn get(&self, id: &EntryId) -> Result<RedisEntry, ApiError> {
        {
            let mut faults = self.faults.write().await;
            if faults.failing_gets > 0 {
                faults.failing_gets = faults.failing_gets.saturating_sub(1);
                return Err(ApiError::unavailable("injected lookup failure"));
            }
        }

        self.entries
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(id))
    }

    async fn update_status(&self, id: &EntryId, status: &ObservedStatus) -> Result<(), ApiError> {
        {
            let mut faults = self.faults.write().await;
            if faults.failing_status_updates > 0 {
                faults.failing_status_updates = faults.failing_status_updates.saturating_sub(1);
                return Err(ApiError::unavailable("injected status update failure"));
            }
        }

        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(id).ok_or_else(|| ApiError::not_found(id))?;
        entry.status = status.clone();
        Ok(())
    }
}
