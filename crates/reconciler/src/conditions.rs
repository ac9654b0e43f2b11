//! Ordered, type-keyed collection of status conditions.
//!
//! Conditions keep the order in which their types were first seen. Updating
//! an existing type rewrites it in place, and an update that changes nothing
//! leaves its transition time alone.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Condition, ConditionStatus};

/// Condition list backed by a type → position index.
///
/// The `Vec` is the iteration and serialization order; the index only
/// avoids a linear scan on upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct Conditions {
    entries: Vec<Condition>,
    index: HashMap<String, usize>,
}

impl Conditions {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update the condition of `type_`.
    ///
    /// Returns `true` when the collection changed.
    pub fn upsert(
        &mut self,
        type_: &str,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let fresh = Condition {
            type_: type_.to_string(),
            status,
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: now,
        };

        match self.index.get(type_).copied() {
            Some(pos) => match self.entries.get_mut(pos) {
                Some(existing) if existing.same_content(status, reason, message) => false,
                Some(existing) => {
                    *existing = fresh;
                    true
                }
                None => false,
            },
            None => {
                self.index.insert(fresh.type_.clone(), self.entries.len());
                self.entries.push(fresh);
                true
            }
        }
    }

    /// Get the condition of `type_`.
    pub fn get(&self, type_: &str) -> Option<&Condition> {
        self.index.get(type_).and_then(|&pos| self.entries.get(pos))
    }

    /// Iterate in first-seen order.
    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.entries.iter()
    }

    /// Conditions in first-seen order.
    pub fn as_slice(&self) -> &[Condition] {
        &self.entries
    }

    /// Number of distinct condition types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no condition has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Types in first-seen order.
    pub fn types(&self) -> Vec<&str> {
        self.entries.iter().map(|c| c.type_.as_str()).collect()
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(list: Vec<Condition>) -> Self {
        let mut conditions = Self::new();
        for condition in list {
            match conditions.index.get(&condition.type_).copied() {
                // duplicate type: first position wins, last content wins
                Some(pos) => {
                    if let Some(slot) = conditions.entries.get_mut(pos) {
                        *slot = condition;
                    }
                }
                None => {
                    conditions
                        .index
                        .insert(condition.type_.clone(), conditions.entries.len());
                    conditions.entries.push(condition);
                }
            }
        }
        conditions
    }
}

impl From<Conditions> for Vec<Condition> {
    fn from(conditions: Conditions) -> Self {
        conditions.entries
    }
}

impl<'a> IntoIterator for &'a Conditions {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing)]

    use chrono::Duration;
    use proptest::prelude::*;

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(secs)
    }

    #[test]
    fn test_upsert_appends_new_type() {
        let mut conditions = Conditions::new();
        assert!(conditions.upsert("Available", ConditionStatus::True, "Success", "ok", t(1)));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions.get("Available").unwrap().last_transition_time, t(1));
    }

    #[test]
    fn test_noop_upsert_keeps_timestamp() {
        let mut conditions = Conditions::new();
        conditions.upsert("Available", ConditionStatus::True, "Success", "ok", t(1));
        let changed = conditions.upsert("Available", ConditionStatus::True, "Success", "ok", t(2));

        assert!(!changed);
        assert_eq!(conditions.get("Available").unwrap().last_transition_time, t(1));
    }

    #[test]
    fn test_changed_upsert_keeps_position() {
        let mut conditions = Conditions::new();
        conditions.upsert("Error", ConditionStatus::True, "RedisError", "boom", t(1));
        conditions.upsert("Available", ConditionStatus::True, "Success", "ok", t(2));
        conditions.upsert("Error", ConditionStatus::True, "RedisError", "timeout", t(3));

        assert_eq!(conditions.types(), vec!["Error", "Available"]);
        let error = conditions.get("Error").unwrap();
        assert_eq!(error.message, "timeout");
        assert_eq!(error.last_transition_time, t(3));
    }

    #[test]
    fn test_each_field_change_is_a_transition() {
        let mut conditions = Conditions::new();
        conditions.upsert("Error", ConditionStatus::True, "A", "m", t(1));
        assert!(conditions.upsert("Error", ConditionStatus::False, "A", "m", t(2)));
        assert!(conditions.upsert("Error", ConditionStatus::False, "B", "m", t(3)));
        assert!(conditions.upsert("Error", ConditionStatus::False, "B", "n", t(4)));
        assert_eq!(conditions.get("Error").unwrap().last_transition_time, t(4));
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let mut conditions = Conditions::new();
        conditions.upsert("Available", ConditionStatus::True, "Success", "ok", t(1));
        let json = serde_json::to_value(&conditions).unwrap();

        assert!(json.is_array());
        assert_eq!(json[0]["type"], "Available");
        assert_eq!(json[0]["status"], "True");
        assert!(json[0].get("lastTransitionTime").is_some());

        let back: Conditions = serde_json::from_value(json).unwrap();
        assert_eq!(back, conditions);
    }

    #[test]
    fn test_deserialize_collapses_duplicates() {
        let json = serde_json::json!([
            {"type": "Error", "status": "True", "reason": "A", "message": "first", "lastTransitionTime": "1970-01-01T00:00:01Z"},
            {"type": "Available", "status": "True", "reason": "Success", "message": "ok", "lastTransitionTime": "1970-01-01T00:00:02Z"},
            {"type": "Error", "status": "True", "reason": "B", "message": "second", "lastTransitionTime": "1970-01-01T00:00:03Z"}
        ]);
        let conditions: Conditions = serde_json::from_value(json).unwrap();

        assert_eq!(conditions.types(), vec!["Error", "Available"]);
        assert_eq!(conditions.get("Error").unwrap().message, "second");
    }

    fn op_strategy() -> impl Strategy<Value = (usize, bool, usize, usize)> {
        (0usize..4, any::<bool>(), 0usize..3, 0usize..3)
    }

    proptest! {
        /// Any upsert sequence leaves one condition per type, ordered by first occurrence.
        #[test]
        fn prop_unique_types_in_first_seen_order(ops in prop::collection::vec(op_strategy(), 0..64)) {
            const TYPES: [&str; 4] = ["Available", "Error", "Degraded", "Progressing"];
            const REASONS: [&str; 3] = ["Success", "RedisError", "ClientUninitialized"];
            const MESSAGES: [&str; 3] = ["ok", "boom", "timeout"];

            let mut conditions = Conditions::new();
            let mut first_seen: Vec<&str> = Vec::new();

            for (i, (ty, status, reason, message)) in ops.iter().enumerate() {
                let ty = TYPES[*ty];
                if !first_seen.contains(&ty) {
                    first_seen.push(ty);
                }
                conditions.upsert(
                    ty,
                    ConditionStatus::from(*status),
                    REASONS[*reason],
                    MESSAGES[*message],
                    t(i as i64),
                );
            }

            prop_assert_eq!(conditions.types(), first_seen);
        }

        /// Repeating the same upsert never moves the transition time.
        #[test]
        fn prop_repeat_upsert_is_stable(repeats in 1usize..16) {
            let mut conditions = Conditions::new();
            conditions.upsert("Available", ConditionStatus::True, "Success", "ok", t(0));
            for i in 0..repeats {
                let changed = conditions.upsert(
                    "Available",
                    ConditionStatus::True,
                    "Success",
                    "ok",
                    t(i as i64 + 1),
                );
                prop_assert!(!changed);
            }
            prop_assert_eq!(conditions.len(), 1);
            prop_assert_eq!(conditions.get("Available").map(|c| c.last_transition_time), Some(t(0)));
        }
    }
}
