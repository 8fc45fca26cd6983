//! Helpers for record parameters.
//!
//! Parameters are stored as JSON values. Nested structures are kept as-is in
//! storage and flattened into dotted keys when a message template is rendered.

use std::collections::BTreeMap;

use annalist_core::{AppError, AppResult};
use serde::Serialize;
use serde_json::Value;

/// Display parameters attached to a record.
pub type RecordParams = BTreeMap<String, Value>;

/// Flattens nested objects and arrays into dotted keys.
///
/// `{"user": {"name": "Ann"}, "tags": ["a"]}` becomes
/// `{"user.name": "Ann", "tags.0": "a"}`. Empty containers produce no key and
/// the first value written for a key is kept.
#[must_use]
pub fn flatten(params: &RecordParams) -> BTreeMap<String, Value> {
    let mut flat = BTreeMap::new();
    for (key, value) in params {
        flatten_into(&mut flat, key.as_str(), value);
    }

    flat
}

fn flatten_into(flat: &mut BTreeMap<String, Value>, key: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (child_key, child) in map {
                flatten_into(flat, format!("{key}.{child_key}").as_str(), child);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(flat, format!("{key}.{index}").as_str(), child);
            }
        }
        scalar => {
            flat.entry(key.to_owned()).or_insert_with(|| scalar.clone());
        }
    }
}

/// Converts flat parameters into `{key}` replacement tokens.
///
/// Only strings, numbers and booleans become tokens.
#[must_use]
pub fn tokenize(flat: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    flat.iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(text) => text.clone(),
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => return None,
            };

            Some((format!("{{{key}}}"), text))
        })
        .collect()
}

/// Replaces every `{token}` in the template with its value.
#[must_use]
pub fn render(template: &str, tokens: &BTreeMap<String, String>) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    // single pass so replacement text is never re-scanned
    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let candidate = &rest[open..];
        let replacement = candidate
            .find('}')
            .map(|close| &candidate[..=close])
            .and_then(|token| tokens.get(token).map(|value| (token.len(), value)));

        match replacement {
            Some((consumed, value)) => {
                rendered.push_str(value);
                rest = &candidate[consumed..];
            }
            None => {
                rendered.push('{');
                rest = &candidate[1..];
            }
        }
    }
    rendered.push_str(rest);

    rendered
}

/// Applies `map` to every scalar leaf, descending into objects and arrays.
#[must_use]
pub fn deep_map(value: Value, map: &impl Fn(Value) -> Value) -> Value {
    match value {
        Value::Object(object) => Value::Object(
            object
                .into_iter()
                .map(|(key, child)| (key, deep_map(child, map)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|child| deep_map(child, map))
                .collect(),
        ),
        scalar => map(scalar),
    }
}

/// Normalizes parameters into storable values and drops top-level nulls.
///
/// Floats without a fractional part are stored as integers so that `5.0` and
/// `5` hash identically.
#[must_use]
pub fn scalarize(params: RecordParams) -> RecordParams {
    params
        .into_iter()
        .map(|(key, value)| (key, deep_map(value, &normalize_scalar)))
        .filter(|(_, value)| !value.is_null())
        .collect()
}

fn normalize_scalar(value: Value) -> Value {
    match value {
        Value::Number(number) if number.is_f64() => match number.as_f64() {
            Some(float) if float.fract() == 0.0 && float.abs() < 9.0e15 => {
                Value::from(float as i64)
            }
            _ => Value::Number(number),
        },
        other => other,
    }
}

/// Serializes any value into a parameter value.
pub fn to_param<T: Serialize + ?Sized>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value)
        .map_err(|error| AppError::Validation(format!("parameter is not serializable: {error}")))
}
