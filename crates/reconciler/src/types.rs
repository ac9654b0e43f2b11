//! Core types for the reconciler.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conditions::Conditions;

/// Condition type recorded after a successful write.
pub const TYPE_AVAILABLE: &str = "Available";
/// Condition type recorded after any failed attempt.
pub const TYPE_ERROR: &str = "Error";

/// Reason attached to the `Available` condition.
pub const REASON_SUCCESS: &str = "Success";
/// Default reason for a rejected store write.
pub const REASON_REDIS_ERROR: &str = "RedisError";
/// Reason used when the store has no usable client.
pub const REASON_CLIENT_UNINITIALIZED: &str = "ClientUninitialized";

/// Message attached to the `Available` condition.
pub const MESSAGE_SUCCESS: &str = "key-value pair successfully set";

/// Namespace assumed when an identity is given without one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Identity of one declared entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId {
    pub namespace: String,
    pub name: String,
}

impl EntryId {
    /// Create a new entry identity.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for EntryId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = match s.split_once('/') {
            Some((ns, name)) => (ns, name),
            None => (DEFAULT_NAMESPACE, s),
        };
        if namespace.is_empty() || name.is_empty() || name.contains('/') {
            return Err(format!("invalid entry identity '{s}'"));
        }
        Ok(Self::new(namespace, name))
    }
}

/// The declared intent for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredEntry {
    /// Key to write in the store.
    pub key: String,
    /// Value the key should hold.
    pub value: String,
    /// Time-to-live in seconds. Absent or zero means no expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl DesiredEntry {
    /// Create a new entry with no expiry.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl: None,
        }
    }

    /// Set the time-to-live in seconds.
    #[must_use]
    pub const fn with_ttl(mut self, secs: u64) -> Self {
        self.ttl = Some(secs);
        self
    }

    /// The expiry to request from the store, if any.
    pub fn effective_ttl(&self) -> Option<Duration> {
        self.ttl.filter(|secs| *secs > 0).map(Duration::from_secs)
    }

    /// Check the constraints the admission layer normally enforces.
    pub fn validate(&self) -> Result<(), String> {
        if self.key.is_empty() {
            return Err("key must not be empty".to_string());
        }
        Ok(())
    }
}

/// Tri-state status of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::True => "True",
            Self::False => "False",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// One fact about an entry's health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Whether status, reason and message all match.
    pub fn same_content(&self, status: ConditionStatus, reason: &str, message: &str) -> bool {
        self.status == status && self.reason == reason && self.message == message
    }
}

/// The system's account of reality for one entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedStatus {
    #[serde(default)]
    pub conditions: Conditions,
    /// Time of the last successful write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Last value successfully written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<String>,
}

impl ObservedStatus {
    /// Get a condition by type.
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.get(type_)
    }

    /// Whether the entry is currently known to be applied.
    pub fn is_available(&self) -> bool {
        self.condition(TYPE_AVAILABLE)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Record a successful write.
    pub(crate) fn record_applied(&mut self, value: &str, now: DateTime<Utc>) {
        self.last_updated = Some(now);
        self.current_value = Some(value.to_string());
    }
}

/// A declared entry together with its observed status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisEntry {
    pub id: EntryId,
    pub spec: DesiredEntry,
    #[serde(default)]
    pub status: ObservedStatus,
}

impl RedisEntry {
    /// Create a new entry with an empty status.
    pub fn new(id: EntryId, spec: DesiredEntry) -> Self {
        Self {
            id,
            spec,
            status: ObservedStatus::default(),
        }
    }
}

/// What the caller should do after a reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    /// Delay before the next pass, if one is wanted.
    pub requeue_after: Option<Duration>,
}

impl Action {
    /// Wait for the next observed change.
    pub const fn await_change() -> Self {
        Self {
            requeue_after: None,
        }
    }

    /// Reconcile again after `delay`.
    pub const fn requeue(delay: Duration) -> Self {
        Self {
            requeue_after: Some(delay),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing)]

    use super::*;

    #[test]
    fn test_effective_ttl() {
        assert_eq!(DesiredEntry::new("k", "v").effective_ttl(), None);
        assert_eq!(DesiredEntry::new("k", "v").with_ttl(0).effective_ttl(), None);
        assert_eq!(
            DesiredEntry::new("k", "v").with_ttl(3600).effective_ttl(),
            Some(Duration::from_secs(3600))
        );
    }

    #[test]
    fn test_validate_rejects_empty_key() {
        assert!(DesiredEntry::new("", "v").validate().is_err());
        assert!(DesiredEntry::new("k", "").validate().is_ok());
    }

    #[test]
    fn test_entry_id_parse() {
        let id: EntryId = "cache/session".parse().unwrap();
        assert_eq!(id, EntryId::new("cache", "session"));
        assert_eq!(id.to_string(), "cache/session");

        let bare: EntryId = "session".parse().unwrap();
        assert_eq!(bare.namespace, DEFAULT_NAMESPACE);

        assert!("a/b/c".parse::<EntryId>().is_err());
        assert!("/b".parse::<EntryId>().is_err());
    }

    #[test]
    fn test_spec_deserializes_without_ttl() {
        let spec: DesiredEntry = serde_json::from_str(r#"{"key":"k1","value":"v1"}"#).unwrap();
        assert_eq!(spec.ttl, None);
    }

    #[test]
    fn test_negative_ttl_rejected() {
        let parsed = serde_json::from_str::<DesiredEntry>(r#"{"key":"k","value":"v","ttl":-1}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let mut status = ObservedStatus::default();
        status.record_applied("v1", Utc::now());
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["currentValue"], "v1");
        assert!(json.get("lastUpdated").is_some());
    }
}
