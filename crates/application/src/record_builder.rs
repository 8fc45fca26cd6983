//! Fluent assembly of validated records.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use annalist_core::ActorIdentity;
use annalist_domain::{
    FieldKind, Level, Record, RecordField, RecordParams, RecordSchema, RecordType, TargetRef,
};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{Chronicler, RecordError, RecordResult, TrackedEntity};

/// Prefix of parameter keys that are builder directives instead of params.
const DIRECTIVE_PREFIX: &str = "record.";

/// Collects record fields and produces a [`Record`] for one schema.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    schema: Arc<RecordSchema>,
    fields: BTreeMap<FieldKind, RecordField>,
    directive_error: Option<String>,
}

impl RecordBuilder {
    /// Creates an empty builder for the schema.
    #[must_use]
    pub fn new(schema: Arc<RecordSchema>) -> Self {
        Self {
            schema,
            fields: BTreeMap::new(),
            directive_error: None,
        }
    }

    /// Validates the collected fields and builds the record.
    pub fn create(&self) -> RecordResult<Record> {
        if let Some(error) = &self.directive_error {
            return Err(RecordError::NotValid(error.clone()));
        }

        for kind in FieldKind::REQUIRED {
            if !self.fields.contains_key(&kind) {
                let structure = serde_json::to_string(&self.fields).unwrap_or_default();
                return Err(RecordError::NotValid(format!(
                    "missing field \"{kind}\" in record structure: {structure}"
                )));
            }
        }

        let mut record = Record::new(
            self.schema.name(),
            self.text_field(FieldKind::Event),
            self.text_field(FieldKind::Message),
        );

        for (kind, field) in &self.fields {
            let Some(setter) = self.schema.setter(*kind) else {
                return Err(RecordError::NotValid(format!(
                    "field \"{kind}\" cannot be set on record schema '{}'",
                    self.schema.name()
                )));
            };
            setter(&mut record, field.clone());
        }

        Ok(record)
    }

    /// Builds the record and writes it through the chronicler.
    pub async fn record(&self, chronicler: &Chronicler, period: Option<&str>) -> RecordResult<Record> {
        chronicler.record(self.clone(), period).await
    }

    /// Returns the value collected for a field.
    #[must_use]
    pub fn field(&self, kind: FieldKind) -> Option<&RecordField> {
        self.fields.get(&kind)
    }

    /// Sets the record type.
    #[must_use]
    pub fn with_type(self, record_type: RecordType) -> Self {
        self.set(RecordField::Type(record_type))
    }

    /// Sets the severity.
    #[must_use]
    pub fn with_level(self, level: Level) -> Self {
        self.set(RecordField::Level(level))
    }

    /// Sets the message template.
    #[must_use]
    pub fn with_message(self, message: impl Into<String>) -> Self {
        self.set(RecordField::Message(message.into()))
    }

    /// Sets the note.
    #[must_use]
    pub fn with_note(self, note: Option<String>) -> Self {
        self.set(RecordField::Note(note))
    }

    /// Records the outcome of an operation.
    ///
    /// `finished` is only set when no earlier call set it; it defaults to
    /// `true` without an error. An error is summarised into the note as
    /// `"<ErrorType>: <message>"`, named after the concrete type `E`.
    /// Type-erased errors go through [`RecordBuilder::with_error_kind`].
    #[must_use]
    pub fn with_error<E>(self, error: Option<&E>, finished: Option<bool>) -> Self
    where
        E: std::error::Error,
    {
        self.with_error_kind(
            short_type_name::<E>(),
            error.map(|error| error as &dyn std::error::Error),
            finished,
        )
    }

    /// Records the outcome of an operation whose error type is only known
    /// by name, such as a boxed `dyn Error`.
    #[must_use]
    pub fn with_error_kind(
        mut self,
        kind: &str,
        error: Option<&dyn std::error::Error>,
        finished: Option<bool>,
    ) -> Self {
        if !self.fields.contains_key(&FieldKind::Finished) {
            let finished = finished.unwrap_or(error.is_none());
            self = self.set(RecordField::Finished(finished));
        }

        match error {
            Some(error) => self.set(RecordField::Note(Some(format!("{kind}: {error}")))),
            None => self,
        }
    }

    /// Sets the event key.
    #[must_use]
    pub fn with_event(self, event: impl Into<String>) -> Self {
        self.set(RecordField::Event(event.into()))
    }

    /// Points the record at an entity.
    ///
    /// Parameters the entity supplies are merged first; an alternate target
    /// the entity redirects to replaces the entity itself.
    #[must_use]
    pub fn with_target(mut self, entity: &dyn TrackedEntity) -> Self {
        if let Some(params) = entity.record_params(None) {
            self = self.with_params(params);
        }

        let target = entity.record_target().unwrap_or_else(|| entity.target_ref());
        self.set(RecordField::Target(target))
    }

    /// Points the record at a target reference.
    #[must_use]
    pub fn with_target_ref(self, target: TargetRef) -> Self {
        self.set(RecordField::Target(target))
    }

    /// Sets the occurrence timestamp.
    #[must_use]
    pub fn with_date(self, date: DateTime<Utc>) -> Self {
        self.set(RecordField::Date(date))
    }

    /// Sets the actor.
    #[must_use]
    pub fn with_owner(self, owner: Option<ActorIdentity>) -> Self {
        self.set(RecordField::Owner(owner))
    }

    /// Alias of [`RecordBuilder::with_owner`] for a known author.
    #[must_use]
    pub fn with_author(self, author: ActorIdentity) -> Self {
        self.with_owner(Some(author))
    }

    /// Sets the completion flag.
    #[must_use]
    pub fn with_finished(self, finished: bool) -> Self {
        self.set(RecordField::Finished(finished))
    }

    /// Merges parameters; keys that are already set keep their value.
    ///
    /// Keys of the form `record.<field>` are not stored. They set the named
    /// field instead, e.g. `"record.level": "danger"`.
    #[must_use]
    pub fn with_params(mut self, params: RecordParams) -> Self {
        let mut plain = RecordParams::new();
        for (key, value) in params {
            match directive(key.as_str()) {
                Some(kind) => self = self.apply_directive(kind, key.as_str(), value),
                None => {
                    plain.insert(key, value);
                }
            }
        }

        let merged = match self.fields.remove(&FieldKind::Params) {
            Some(RecordField::Params(mut existing)) => {
                for (key, value) in plain {
                    existing.entry(key).or_insert(value);
                }
                existing
            }
            _ => plain,
        };

        self.set(RecordField::Params(merged))
    }

    /// Sets one parameter, replacing any previous value.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut params = match self.fields.remove(&FieldKind::Params) {
            Some(RecordField::Params(existing)) => existing,
            _ => RecordParams::new(),
        };
        params.insert(name.into(), value.into());

        self.set(RecordField::Params(params))
    }

    /// Removes all parameters.
    #[must_use]
    pub fn clear_params(mut self) -> Self {
        self.fields.remove(&FieldKind::Params);
        self
    }

    fn set(mut self, field: RecordField) -> Self {
        self.fields.insert(field.kind(), field);
        self
    }

    fn text_field(&self, kind: FieldKind) -> String {
        match self.fields.get(&kind) {
            Some(RecordField::Event(text) | RecordField::Message(text)) => text.clone(),
            _ => String::new(),
        }
    }

    fn apply_directive(mut self, kind: FieldKind, key: &str, value: Value) -> Self {
        match directive_field(kind, value) {
            Ok(RecordField::Params(params)) => self.with_params(params),
            Ok(field) => self.set(field),
            Err(reason) => {
                self.directive_error
                    .get_or_insert_with(|| format!("directive '{key}' {reason}"));
                self
            }
        }
    }
}

fn directive(key: &str) -> Option<FieldKind> {
    let prefix = key.get(..DIRECTIVE_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(DIRECTIVE_PREFIX) {
        return None;
    }

    let name = &key[DIRECTIVE_PREFIX.len()..];
    if name.is_empty()
        || !name
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || character == '_')
    {
        return None;
    }

    FieldKind::parse(name)
}

fn directive_field(kind: FieldKind, value: Value) -> Result<RecordField, String> {
    let text = |value: Value| match value {
        Value::String(text) => Ok(text),
        other => Err(format!("expects a string, got {other}")),
    };

    match kind {
        FieldKind::Type => RecordType::from_str(text(value)?.as_str())
            .map(RecordField::Type)
            .map_err(|error| error.to_string()),
        FieldKind::Level => Level::from_str(text(value)?.as_str())
            .map(RecordField::Level)
            .map_err(|error| error.to_string()),
        FieldKind::Message => text(value).map(RecordField::Message),
        FieldKind::Event => text(value).map(RecordField::Event),
        FieldKind::Note => match value {
            Value::Null => Ok(RecordField::Note(None)),
            other => text(other).map(|note| RecordField::Note(Some(note))),
        },
        FieldKind::Date => DateTime::parse_from_rfc3339(text(value)?.as_str())
            .map(|date| RecordField::Date(date.with_timezone(&Utc)))
            .map_err(|error| format!("expects an RFC 3339 date: {error}")),
        FieldKind::Owner => match value {
            Value::Null => Ok(RecordField::Owner(None)),
            other => text(other).map(|subject| RecordField::Owner(Some(ActorIdentity::new(subject)))),
        },
        FieldKind::Finished => match value {
            Value::Bool(finished) => Ok(RecordField::Finished(finished)),
            other => Err(format!("expects a boolean, got {other}")),
        },
        FieldKind::Target => serde_json::from_value::<TargetRef>(value)
            .map(RecordField::Target)
            .map_err(|error| format!("expects a target reference: {error}")),
        FieldKind::Params => serde_json::from_value::<RecordParams>(value)
            .map(RecordField::Params)
            .map_err(|error| format!("expects an object: {error}")),
    }
}

fn short_type_name<E>() -> &'static str {
    let full = std::any::type_name::<E>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

#[cfg(test)]
mod tests;
