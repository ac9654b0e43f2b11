//! K8s-style reconciliation of declared key-value entries into Redis.
//!
//! A user declares "this key should hold this value, optionally expiring
//! after N seconds". Each reconcile pass:
//!
//! 1. Fetches the declared entry through an [`EntryApi`]
//! 2. Writes it through a [`StoreClient`]
//! 3. Upserts one status condition describing the outcome
//! 4. Persists the status and tells the caller whether to requeue
//!
//! # Conditions
//!
//! - `Available` / `Success` after a successful write
//! - `Error` / `ClientUninitialized` when the store has no usable client
//! - `Error` / `RedisError` (or a store-specific code) when the write fails
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use redis_ctrl_reconciler::{
//!     DesiredEntry, EntryId, InMemoryEntryApi, InMemoryStore, Reconciler, ReconcilerConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let api = InMemoryEntryApi::new_arc();
//!     let store = InMemoryStore::new_arc();
//!     let id = EntryId::new("default", "greeting");
//!     api.apply(id.clone(), DesiredEntry::new("hello", "world")).await;
//!
//!     let reconciler = Reconciler::new(api, store, ReconcilerConfig::default());
//!     let action = reconciler.reconcile(&id).await;
//! }
//! ```

pub mod api;
pub mod conditions;
pub mod dispatch;
pub mod error;
pub mod reconciler;
pub mod redis;
pub mod store;
pub mod types;

// Re-export main types
pub use api::{ApiError, EntryApi, InMemoryEntryApi};
pub use conditions::Conditions;
pub use dispatch::{DispatchConfig, DispatchHandle, Dispatcher, StatsSnapshot};
pub use error::{Error, Result, Stage};
pub use reconciler::{Reconciler, ReconcilerBuilder, ReconcilerConfig};
pub use redis::{RedisConfig, RedisStore};
pub use store::{InMemoryStore, SetCall, StoreClient, StoreError, TracingStore};
pub use types::{
    Action, Condition, ConditionStatus, DesiredEntry, EntryId, ObservedStatus, RedisEntry,
};
