//! End-to-end reconcile passes against the in-memory entry API and store.
//!
//! Behaviours verified:
//! - Repeating a pass on an unchanged entry is idempotent
//! - TTL zero or absent requests no expiry
//! - A deleted entry ends the lifecycle without a write
//! - Store failures are recorded and requeued after the fixed delay
//! - Recovery from Error to Available, one condition type per pass

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use redis_ctrl_reconciler::{
    Action, ConditionStatus, DesiredEntry, EntryId, Error, InMemoryEntryApi, InMemoryStore,
    ObservedStatus, Reconciler, ReconcilerConfig, SetCall, StoreError,
};

struct Harness {
    api: Arc<InMemoryEntryApi>,
    store: Arc<InMemoryStore>,
    reconciler: Reconciler,
}

impl Harness {
    fn new() -> Self {
        let api = InMemoryEntryApi::new_arc();
        let store = InMemoryStore::new_arc();
        let reconciler = Reconciler::new(api.clone(), store.clone(), ReconcilerConfig::default());
        Self {
            api,
            store,
            reconciler,
        }
    }

    async fn declare(&self, name: &str, spec: DesiredEntry) -> EntryId {
        let id = EntryId::new("default", name);
        self.api.apply(id.clone(), spec).await;
        id
    }

    async fn status(&self, id: &EntryId) -> ObservedStatus {
        match self.api.status(id).await {
            Some(status) => status,
            None => panic!("entry {id} has no status"),
        }
    }
}

#[tokio::test]
async fn example_scenario_sets_available() {
    let h = Harness::new();
    let id = h.declare("example", DesiredEntry::new("k1", "v1")).await;

    let action = h.reconciler.reconcile(&id).await.unwrap();
    assert_eq!(action.requeue_after, None);

    let status = h.status(&id).await;
    assert_eq!(status.conditions.len(), 1);
    let condition = &status.conditions.as_slice()[0];
    assert_eq!(condition.type_, "Available");
    assert_eq!(condition.status, ConditionStatus::True);
    assert_eq!(condition.reason, "Success");
    assert_eq!(status.current_value.as_deref(), Some("v1"));
}

#[tokio::test]
async fn reconcile_twice_is_idempotent() {
    let h = Harness::new();
    let id = h.declare("idem", DesiredEntry::new("k1", "v1")).await;

    h.reconciler.reconcile(&id).await.unwrap();
    let first = h.status(&id).await;

    h.reconciler.reconcile(&id).await.unwrap();
    let second = h.status(&id).await;

    assert_eq!(first.conditions, second.conditions);
    assert_eq!(
        first.conditions.get("Available").unwrap().last_transition_time,
        second.conditions.get("Available").unwrap().last_transition_time
    );
    assert_eq!(second.current_value, first.current_value);
    assert_eq!(h.store.call_count().await, 2);
}

#[tokio::test]
async fn ttl_zero_or_absent_requests_no_expiry() {
    let h = Harness::new();
    let absent = h.declare("absent", DesiredEntry::new("a", "1")).await;
    let zero = h.declare("zero", DesiredEntry::new("z", "2").with_ttl(0)).await;
    let hour = h.declare("hour", DesiredEntry::new("h", "3").with_ttl(3600)).await;

    for id in [&absent, &zero, &hour] {
        h.reconciler.reconcile(id).await.unwrap();
    }

    let calls = h.store.calls().await;
    assert_eq!(
        calls,
        vec![
            SetCall {
                key: "a".into(),
                value: "1".into(),
                ttl: None
            },
            SetCall {
                key: "z".into(),
                value: "2".into(),
                ttl: None
            },
            SetCall {
                key: "h".into(),
                value: "3".into(),
                ttl: Some(Duration::from_secs(3600))
            },
        ]
    );
}

#[tokio::test]
async fn deleted_entry_is_terminal() {
    let h = Harness::new();
    let id = h.declare("gone", DesiredEntry::new("k", "v")).await;
    h.api.delete(&id).await;

    let action = h.reconciler.reconcile(&id).await.unwrap();
    assert_eq!(action, Action::await_change());
    assert_eq!(h.store.call_count().await, 0);
}

#[tokio::test]
async fn store_failure_records_error_and_requeues() {
    let h = Harness::new();
    let id = h.declare("broken", DesiredEntry::new("k", "v")).await;
    h.store.fail_next(StoreError::operation("redis error")).await;

    let err = h.reconciler.reconcile(&id).await.unwrap_err();
    assert!(matches!(err, Error::StoreWrite { .. }));
    assert_eq!(err.requeue_after(), Some(Duration::from_secs(5)));

    let status = h.status(&id).await;
    assert_eq!(status.conditions.types(), vec!["Error"]);
    let condition = status.conditions.get("Error").unwrap();
    assert_eq!(condition.status, ConditionStatus::True);
    assert_eq!(condition.reason, "RedisError");
    assert_eq!(condition.message, "redis error");
    assert_eq!(status.current_value, None);
    assert_eq!(status.last_updated, None);
}

#[tokio::test]
async fn recovery_adds_available_without_touching_error() {
    let h = Harness::new();
    let id = h.declare("flaky", DesiredEntry::new("k", "v")).await;

    h.store.fail_next(StoreError::operation("redis error")).await;
    assert!(h.reconciler.reconcile(&id).await.is_err());
    let failed = h.status(&id).await;
    assert_eq!(failed.conditions.types(), vec!["Error"]);

    h.reconciler.reconcile(&id).await.unwrap();
    let recovered = h.status(&id).await;

    // the success pass upserts Available only
    assert_eq!(recovered.conditions.types(), vec!["Error", "Available"]);
    let available: Vec<_> = recovered
        .conditions
        .iter()
        .filter(|c| c.type_ == "Available")
        .collect();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].status, ConditionStatus::True);
    assert_eq!(
        recovered.conditions.get("Error"),
        failed.conditions.get("Error")
    );
    assert!(recovered.is_available());
}

#[tokio::test]
async fn each_pass_upserts_a_single_condition_type() {
    let h = Harness::new();
    let id = h.declare("single", DesiredEntry::new("k", "v")).await;

    h.reconciler.reconcile(&id).await.unwrap();
    let after_success = h.status(&id).await;
    assert_eq!(after_success.conditions.types(), vec!["Available"]);

    h.store.fail_next(StoreError::operation("boom")).await;
    let _ = h.reconciler.reconcile(&id).await;
    let after_failure = h.status(&id).await;

    assert_eq!(after_failure.conditions.types(), vec!["Available", "Error"]);
    assert_eq!(
        after_failure.conditions.get("Available"),
        after_success.conditions.get("Available")
    );
}

#[tokio::test]
async fn repeated_failures_keep_one_error_in_place() {
    let h = Harness::new();
    let id = h.declare("repeat", DesiredEntry::new("k", "v")).await;
    h.reconciler.reconcile(&id).await.unwrap();

    for detail in ["timeout", "timeout", "connection refused"] {
        h.store.fail_next(StoreError::operation(detail)).await;
        let _ = h.reconciler.reconcile(&id).await;
    }

    let status = h.status(&id).await;
    assert_eq!(status.conditions.types(), vec!["Available", "Error"]);
    assert_eq!(
        status.conditions.get("Error").unwrap().message,
        "connection refused"
    );
}
