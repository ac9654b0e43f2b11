//! Error types for the reconciler crate.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::types::EntryId;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Collaborator call that was running when a deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lookup,
    StoreWrite,
    StatusUpdate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Lookup => "lookup",
            Self::StoreWrite => "store write",
            Self::StatusUpdate => "status update",
        };
        f.write_str(s)
    }
}

/// Reconciler error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Reading the entry failed for a reason other than deletion.
    #[error("failed to fetch entry '{id}': {reason}")]
    Lookup { id: EntryId, reason: String },

    /// The store rejected the write.
    #[error("failed to set key '{key}': {detail}")]
    StoreWrite {
        key: String,
        code: String,
        detail: String,
        retry_after: Duration,
    },

    /// Saving the observed status failed.
    #[error("failed to update status of '{id}': {reason}")]
    StatusPersistence {
        id: EntryId,
        reason: String,
        retry_after: Duration,
    },

    /// The pass ran out of time.
    #[error("deadline exceeded during {stage} for '{id}'")]
    DeadlineExceeded { id: EntryId, stage: Stage },

    /// The pass was stopped before it finished. Nothing was persisted.
    #[error("reconcile of '{id}' cancelled")]
    Cancelled { id: EntryId },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The dispatch loop is no longer accepting work.
    #[error("dispatch loop stopped")]
    DispatchStopped,
}

impl Error {
    /// Create a lookup error.
    pub fn lookup(id: &EntryId, reason: impl Into<String>) -> Self {
        Self::Lookup {
            id: id.clone(),
            reason: reason.into(),
        }
    }

    /// Create a status persistence error.
    pub fn status_persistence(
        id: &EntryId,
        reason: impl Into<String>,
        retry_after: Duration,
    ) -> Self {
        Self::StatusPersistence {
            id: id.clone(),
            reason: reason.into(),
            retry_after,
        }
    }

    /// Create a deadline error.
    pub fn deadline_exceeded(id: &EntryId, stage: Stage) -> Self {
        Self::DeadlineExceeded {
            id: id.clone(),
            stage,
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(id: &EntryId) -> Self {
        Self::Cancelled { id: id.clone() }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Delay the caller should wait before the next pass.
    ///
    /// `None` leaves the delay to the caller's own backoff.
    pub const fn requeue_after(&self) -> Option<Duration> {
        match self {
            Self::StoreWrite { retry_after, .. } | Self::StatusPersistence { retry_after, .. } => {
                Some(*retry_after)
            }
            Self::Lookup { .. }
            | Self::DeadlineExceeded { .. }
            | Self::Cancelled { .. }
            | Self::InvalidConfig { .. }
            | Self::DispatchStopped => None,
        }
    }

    /// Whether retrying can succeed without operator action.
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::InvalidConfig { .. } | Self::DispatchStopped)
    }
}
