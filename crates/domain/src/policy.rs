//! Override policies controlling what appears in an audit diff.
//!
//! Policies are registered once at startup, either through explicit calls or
//! from a [`PolicyTable`] loaded from configuration.

use std::collections::{HashMap, HashSet};

use annalist_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ChangeSet, FieldChange};

/// How a policy treats a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Replace the field's value with a placeholder.
    Conceal,
    /// Drop the field from the diff.
    Ignore,
}

/// Per-field override applied while building a diff.
#[derive(Debug, Clone, PartialEq)]
pub enum OverridePolicy {
    /// Keep the field as changed but replace its content.
    Conceal(Value),
    /// Remove the field entirely.
    Ignore,
}

impl OverridePolicy {
    /// Returns the strategy of this policy.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Conceal(_) => Strategy::Conceal,
            Self::Ignore => Strategy::Ignore,
        }
    }

    /// Applies the policy to one field of a change set.
    ///
    /// Concealing only touches fields that are part of the diff, so a field
    /// that did not change is not reported as changed.
    pub fn apply(&self, changes: &mut ChangeSet, field: &str) {
        match self {
            Self::Conceal(value) => {
                if changes.contains(field) {
                    changes.insert(field, FieldChange::Value(value.clone()));
                }
            }
            Self::Ignore => {
                changes.remove(field);
            }
        }
    }
}

/// Registry of field policies and untracked types.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    fields: HashMap<String, Vec<(String, OverridePolicy)>>,
    ignored_types: HashSet<String>,
}

impl PolicyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a configuration table.
    pub fn from_table(table: PolicyTable) -> AppResult<Self> {
        let mut registry = Self::new();
        for entry in table.types {
            if entry.ignore {
                registry = registry.ignore_type(entry.entity_type.as_str());
            }

            for field in entry.fields {
                let policy = match (field.strategy, field.value) {
                    (Strategy::Ignore, None) => OverridePolicy::Ignore,
                    (Strategy::Ignore, Some(_)) => {
                        return Err(AppError::Validation(format!(
                            "ignore policy for '{}.{}' must not carry a value",
                            entry.entity_type, field.field
                        )));
                    }
                    (Strategy::Conceal, value) => OverridePolicy::Conceal(value.unwrap_or(Value::Null)),
                };
                registry.register(entry.entity_type.as_str(), field.field.as_str(), policy)?;
            }
        }

        Ok(registry)
    }

    /// Parses a JSON policy table.
    pub fn from_json(json: &str) -> AppResult<Self> {
        let table: PolicyTable = serde_json::from_str(json)
            .map_err(|error| AppError::Validation(format!("invalid policy table: {error}")))?;
        Self::from_table(table)
    }

    /// Registers a conceal policy.
    pub fn conceal(
        mut self,
        entity_type: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> AppResult<Self> {
        self.register(entity_type, field, OverridePolicy::Conceal(value.into()))?;
        Ok(self)
    }

    /// Registers an ignore policy.
    pub fn ignore_field(mut self, entity_type: &str, field: &str) -> AppResult<Self> {
        self.register(entity_type, field, OverridePolicy::Ignore)?;
        Ok(self)
    }

    /// Marks a type as never tracked.
    #[must_use]
    pub fn ignore_type(mut self, entity_type: &str) -> Self {
        self.ignored_types.insert(entity_type.to_owned());
        self
    }

    fn register(&mut self, entity_type: &str, field: &str, policy: OverridePolicy) -> AppResult<()> {
        let policies = self.fields.entry(entity_type.to_owned()).or_default();
        if policies.iter().any(|(existing, _)| existing == field) {
            return Err(AppError::Validation(format!(
                "policy for '{entity_type}.{field}' is already registered"
            )));
        }

        policies.push((field.to_owned(), policy));
        Ok(())
    }

    /// Returns whether a type must never be tracked.
    #[must_use]
    pub fn is_type_ignored(&self, entity_type: &str) -> bool {
        self.ignored_types.contains(entity_type)
    }

    /// Returns the field policies of a type in declaration order.
    #[must_use]
    pub fn policies(&self, entity_type: &str) -> &[(String, OverridePolicy)] {
        self.fields
            .get(entity_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Applies every policy declared for the type.
    pub fn apply(&self, entity_type: &str, changes: &mut ChangeSet) {
        for (field, policy) in self.policies(entity_type) {
            policy.apply(changes, field.as_str());
        }
    }
}

/// Serializable policy configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyTable {
    /// Per-type entries.
    #[serde(default)]
    pub types: Vec<TypePolicy>,
}

/// Policies of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypePolicy {
    /// Entity type identifier.
    pub entity_type: String,
    /// Skip the type entirely.
    #[serde(default)]
    pub ignore: bool,
    /// Field policies in declaration order.
    #[serde(default)]
    pub fields: Vec<FieldPolicy>,
}

/// Policy of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPolicy {
    /// Field name.
    pub field: String,
    /// Strategy to apply.
    pub strategy: Strategy,
    /// Placeholder for concealed fields.
    #[serde(default)]
    pub value: Option<Value>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::PolicyRegistry;
    use crate::{ChangeSet, FieldChange};

    fn changes() -> ChangeSet {
        let mut changes = ChangeSet::new();
        changes.insert("a", FieldChange::pair(json!(1), json!(2)));
        changes.insert("b", FieldChange::pair(json!("x"), json!("y")));
        changes
    }

    #[test]
    fn conceal_and_ignore_hide_real_values() {
        let registry = PolicyRegistry::new()
            .conceal("user", "b", "REDACTED")
            .and_then(|registry| registry.ignore_field("user", "a"));
        let Ok(registry) = registry else {
            panic!("registry should build");
        };

        let mut diff = changes();
        registry.apply("user", &mut diff);

        assert!(!diff.contains("a"));
        assert_eq!(diff.get("b"), Some(&FieldChange::Value(json!("REDACTED"))));
        assert_eq!(diff.len(), 1);
    }

    #[test]
    fn conceal_does_not_add_unchanged_fields() {
        let Ok(registry) = PolicyRegistry::new().conceal("user", "password", "***") else {
            panic!("registry should build");
        };

        let mut diff = changes();
        registry.apply("user", &mut diff);
        assert!(!diff.contains("password"));
    }

    #[test]
    fn policies_of_other_types_do_not_apply() {
        let Ok(registry) = PolicyRegistry::new().ignore_field("order", "a") else {
            panic!("registry should build");
        };

        let mut diff = changes();
        registry.apply("user", &mut diff);
        assert_eq!(diff.len(), 2);
    }

    #[test]
    fn duplicate_field_policy_is_rejected() {
        let registry = PolicyRegistry::new()
            .ignore_field("user", "a")
            .and_then(|registry| registry.conceal("user", "a", "x"));
        assert!(registry.is_err());
    }

    #[test]
    fn table_loads_from_json() {
        let registry = PolicyRegistry::from_json(
            r#"{
                "types": [
                    {"entity_type": "session", "ignore": true},
                    {"entity_type": "user", "fields": [
                        {"field": "password", "strategy": "conceal", "value": "***"},
                        {"field": "updated_at", "strategy": "ignore"}
                    ]}
                ]
            }"#,
        );
        let Ok(registry) = registry else {
            panic!("policy table should parse");
        };

        assert!(registry.is_type_ignored("session"));
        assert!(!registry.is_type_ignored("user"));
        assert_eq!(registry.policies("user").len(), 2);
        assert_eq!(registry.policies("user")[0].0, "password");
    }

    #[test]
    fn ignore_with_value_is_rejected() {
        let registry = PolicyRegistry::from_json(
            r#"{"types": [{"entity_type": "user", "fields": [
                {"field": "a", "strategy": "ignore", "value": 1}
            ]}]}"#,
        );
        assert!(registry.is_err());
    }
}
