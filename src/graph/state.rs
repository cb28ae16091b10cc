//! Typed workflow state with per-field merge strategies.
//!
//! Every state update flows through the field's declared strategy; nothing
//! writes the state map directly. The schema is strict by default: merging
//! an undeclared field is an error rather than a silent write.

use super::error::GraphError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// State field values keyed by name.
pub type StateMap = Map<String, Value>;

/// How a field combines an existing value with an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Replace the existing value.
    #[default]
    Overwrite,
    /// Concatenate lists or strings.
    Append,
    /// Deep-merge maps.
    Merge,
    /// Retain the existing value, ignore the update.
    Keep,
}

/// Combine an old and a new value under a strategy.
pub fn merge_values(old: Option<&Value>, new: Value, strategy: MergeStrategy) -> Value {
    match strategy {
        MergeStrategy::Overwrite => new,
        MergeStrategy::Keep => match old {
            Some(value) if !value.is_null() => value.clone(),
            _ => new,
        },
        MergeStrategy::Append => match old {
            Some(Value::Array(existing)) => {
                let mut combined = existing.clone();
                match new {
                    Value::Array(items) => combined.extend(items),
                    other => combined.push(other),
                }
                Value::Array(combined)
            }
            Some(Value::String(existing)) => match new {
                Value::String(suffix) => Value::String(format!("{}{}", existing, suffix)),
                other => other,
            },
            Some(value) if !value.is_null() => new,
            _ => new,
        },
        MergeStrategy::Merge => match old {
            Some(Value::Object(existing)) => match new {
                Value::Object(updates) => Value::Object(deep_merge(existing, updates)),
                other => other,
            },
            Some(value) if !value.is_null() => new,
            _ => new,
        },
    }
}

fn deep_merge(base: &Map<String, Value>, updates: Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in updates {
        match (merged.get(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                let nested = deep_merge(existing, incoming);
                merged.insert(key, Value::Object(nested));
            }
            (_, value) => {
                merged.insert(key, value);
            }
        }
    }
    merged
}

/// Declared field set of a workflow state.
#[derive(Debug, Clone, Default)]
pub struct StateSchema {
    fields: HashMap<String, MergeStrategy>,
    allow_undeclared: bool,
}

impl StateSchema {
    /// Create an empty, strict schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field with its merge strategy.
    pub fn field(mut self, name: impl Into<String>, strategy: MergeStrategy) -> Self {
        self.fields.insert(name.into(), strategy);
        self
    }

    /// Accept undeclared fields, merged with OVERWRITE.
    pub fn allow_undeclared(mut self) -> Self {
        self.allow_undeclared = true;
        self
    }

    /// Strategy declared for a field.
    pub fn strategy_for(&self, name: &str) -> Option<MergeStrategy> {
        self.fields.get(name).copied()
    }

    /// Whether the field may be merged, and with which strategy.
    pub fn resolve(&self, name: &str) -> Result<MergeStrategy, GraphError> {
        match self.fields.get(name) {
            Some(strategy) => Ok(*strategy),
            None if self.allow_undeclared => Ok(MergeStrategy::Overwrite),
            None => Err(GraphError::UnknownField(name.to_string())),
        }
    }

    /// Declared field names.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }
}

/// Immutable snapshot of state at a step boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub step: u64,
    pub timestamp: DateTime<Utc>,
    pub state: StateMap,
}

/// Owns the canonical state plus its snapshot history.
#[derive(Debug, Clone)]
pub struct StateManager {
    schema: StateSchema,
    state: StateMap,
    history: Vec<StateSnapshot>,
    max_history: usize,
}

impl StateManager {
    /// Create a manager; the initial state is validated against a strict
    /// schema.
    pub fn new(schema: StateSchema, initial: StateMap) -> Result<Self, GraphError> {
        for key in initial.keys() {
            schema.resolve(key)?;
        }
        Ok(Self {
            schema,
            state: initial,
            history: Vec::new(),
            max_history: 100,
        })
    }

    /// Current state.
    pub fn state(&self) -> &StateMap {
        &self.state
    }

    /// Cloned view of the current state, for node execution.
    pub fn view(&self) -> StateMap {
        self.state.clone()
    }

    /// Value of a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    /// Apply a partial update, routing every field through its strategy.
    ///
    /// All field names are validated before any mutation, so a rejected
    /// update leaves the state untouched.
    pub fn apply(&mut self, updates: StateMap) -> Result<(), GraphError> {
        let mut resolved = Vec::with_capacity(updates.len());
        for (key, value) in updates {
            let strategy = self.schema.resolve(&key)?;
            resolved.push((key, value, strategy));
        }
        for (key, value, strategy) in resolved {
            let merged = merge_values(self.state.get(&key), value, strategy);
            self.state.insert(key, merged);
        }
        Ok(())
    }

    /// Record a snapshot of the current state.
    pub fn snapshot(&mut self, step: u64) -> &StateSnapshot {
        self.history.push(StateSnapshot {
            step,
            timestamp: Utc::now(),
            state: self.state.clone(),
        });
        if self.history.len() > self.max_history {
            let excess = self.history.len() - self.max_history;
            self.history.drain(..excess);
        }
        self.history.last().unwrap()
    }

    /// Snapshot history, oldest first.
    pub fn history(&self) -> &[StateSnapshot] {
        &self.history
    }

    /// Roll back `steps` snapshots, restoring that state.
    ///
    /// Returns false when the history is too short.
    pub fn rollback(&mut self, steps: usize) -> bool {
        if steps == 0 || steps > self.history.len() {
            return false;
        }
        let target = self.history.len() - steps;
        let snapshot = self.history[target].clone();
        self.state = snapshot.state;
        self.history.truncate(target + 1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, Value)]) -> StateMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn overwrite_replaces() {
        let merged = merge_values(Some(&json!(1)), json!(2), MergeStrategy::Overwrite);
        assert_eq!(merged, json!(2));
    }

    #[test]
    fn keep_retains_existing() {
        let merged = merge_values(Some(&json!("old")), json!("new"), MergeStrategy::Keep);
        assert_eq!(merged, json!("old"));
        // A null or missing old value is replaced.
        let merged = merge_values(None, json!("new"), MergeStrategy::Keep);
        assert_eq!(merged, json!("new"));
        let merged = merge_values(Some(&Value::Null), json!("new"), MergeStrategy::Keep);
        assert_eq!(merged, json!("new"));
    }

    #[test]
    fn append_concatenates_lists_and_strings() {
        let merged = merge_values(
            Some(&json!([1, 2])),
            json!([3]),
            MergeStrategy::Append,
        );
        assert_eq!(merged, json!([1, 2, 3]));

        let merged = merge_values(Some(&json!("ab")), json!("cd"), MergeStrategy::Append);
        assert_eq!(merged, json!("abcd"));

        // Scalar appended to a list is pushed.
        let merged = merge_values(Some(&json!([1])), json!(2), MergeStrategy::Append);
        assert_eq!(merged, json!([1, 2]));
    }

    #[test]
    fn merge_deep_merges_maps() {
        let old = json!({"a": {"x": 1, "y": 2}, "b": 1});
        let new = json!({"a": {"y": 3, "z": 4}});
        let merged = merge_values(Some(&old), new, MergeStrategy::Merge);
        assert_eq!(merged, json!({"a": {"x": 1, "y": 3, "z": 4}, "b": 1}));
    }

    #[test]
    fn merged_value_is_strategy_of_old_and_new() {
        // For non-overwrite strategies the result is never just the
        // partial update when an old value exists.
        let old = json!([1]);
        let partial = json!([2]);
        let merged = merge_values(Some(&old), partial.clone(), MergeStrategy::Append);
        assert_ne!(merged, partial);
    }

    #[test]
    fn strict_schema_rejects_undeclared_fields() {
        let schema = StateSchema::new().field("known", MergeStrategy::Overwrite);
        let mut manager = StateManager::new(schema, StateMap::new()).unwrap();

        let err = manager
            .apply(map(&[("unknown", json!(1))]))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownField(_)));
        assert!(manager.state().is_empty());
    }

    #[test]
    fn rejected_update_mutates_nothing() {
        let schema = StateSchema::new().field("a", MergeStrategy::Overwrite);
        let mut manager = StateManager::new(schema, map(&[("a", json!(1))])).unwrap();

        let err = manager
            .apply(map(&[("a", json!(2)), ("ghost", json!(3))]))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownField(_)));
        assert_eq!(manager.get("a"), Some(&json!(1)));
    }

    #[test]
    fn open_schema_accepts_anything() {
        let schema = StateSchema::new().allow_undeclared();
        let mut manager = StateManager::new(schema, StateMap::new()).unwrap();
        manager.apply(map(&[("anything", json!(true))])).unwrap();
        assert_eq!(manager.get("anything"), Some(&json!(true)));
    }

    #[test]
    fn apply_respects_declared_strategies() {
        let schema = StateSchema::new()
            .field("log", MergeStrategy::Append)
            .field("count", MergeStrategy::Overwrite);
        let mut manager =
            StateManager::new(schema, map(&[("log", json!(["a"])), ("count", json!(1))])).unwrap();

        manager
            .apply(map(&[("log", json!(["b"])), ("count", json!(2))]))
            .unwrap();

        assert_eq!(manager.get("log"), Some(&json!(["a", "b"])));
        assert_eq!(manager.get("count"), Some(&json!(2)));
    }

    #[test]
    fn initial_state_is_validated() {
        let schema = StateSchema::new().field("a", MergeStrategy::Overwrite);
        assert!(StateManager::new(schema, map(&[("b", json!(1))])).is_err());
    }

    #[test]
    fn snapshots_and_rollback() {
        let schema = StateSchema::new().allow_undeclared();
        let mut manager = StateManager::new(schema, map(&[("v", json!(0))])).unwrap();

        manager.snapshot(0);
        manager.apply(map(&[("v", json!(1))])).unwrap();
        manager.snapshot(1);
        manager.apply(map(&[("v", json!(2))])).unwrap();

        assert_eq!(manager.history().len(), 2);
        assert!(manager.rollback(1));
        assert_eq!(manager.get("v"), Some(&json!(1)));
        assert!(!manager.rollback(5));
    }
}
