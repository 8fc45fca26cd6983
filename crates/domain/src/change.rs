use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::RecordParams;

/// One field's entry in a change set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldChange {
    /// Previous and current value as reported by the host.
    Pair {
        /// Value before the change.
        old: Value,
        /// Value after the change.
        new: Value,
    },
    /// A single value: the new value of an inserted entity, a concealed
    /// placeholder, or a snapshot value.
    Value(Value),
}

impl FieldChange {
    /// Creates an old/new pair.
    #[must_use]
    pub fn pair(old: impl Into<Value>, new: impl Into<Value>) -> Self {
        Self::Pair {
            old: old.into(),
            new: new.into(),
        }
    }

    /// Drops the old half of a pair.
    #[must_use]
    pub fn into_new(self) -> Self {
        match self {
            Self::Pair { new, .. } => Self::Value(new),
            value => value,
        }
    }

    /// Returns the parameter representation: `[old, new]` or the value.
    #[must_use]
    pub fn into_param(self) -> Value {
        match self {
            Self::Pair { old, new } => Value::Array(vec![old, new]),
            Self::Value(value) => value,
        }
    }
}

/// Field-level diff of one entity, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet(BTreeMap<String, FieldChange>);

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a change for a field, replacing any previous entry.
    pub fn insert(&mut self, field: impl Into<String>, change: FieldChange) {
        self.0.insert(field.into(), change);
    }

    /// Removes a field.
    pub fn remove(&mut self, field: &str) -> Option<FieldChange> {
        self.0.remove(field)
    }

    /// Returns the change for a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.0.get(field)
    }

    /// Returns whether the field is part of the change set.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Returns whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of changed fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the changed field names.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Overlays `newer` on top of this change set.
    ///
    /// Newer entries win, except that when both sides carry a pair the
    /// older "old" value is kept so the result spans both changes.
    pub fn merge(&mut self, newer: ChangeSet) {
        for (field, change) in newer.0 {
            let merged = match (self.0.remove(&field), change) {
                (Some(FieldChange::Pair { old, .. }), FieldChange::Pair { new, .. }) => {
                    FieldChange::Pair { old, new }
                }
                (_, change) => change,
            };
            self.0.insert(field, merged);
        }
    }

    /// Collapses every pair to its new value.
    #[must_use]
    pub fn into_new_values(self) -> Self {
        Self(
            self.0
                .into_iter()
                .map(|(field, change)| (field, change.into_new()))
                .collect(),
        )
    }

    /// Converts the change set into record parameters.
    #[must_use]
    pub fn into_params(self) -> RecordParams {
        self.0
            .into_iter()
            .map(|(field, change)| (field, change.into_param()))
            .collect()
    }
}

impl FromIterator<(String, FieldChange)> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = (String, FieldChange)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
