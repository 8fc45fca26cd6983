//! Settable-field registry for record streams.
//!
//! A record schema names one logical log stream and declares which record
//! fields the stream accepts. The record builder dispatches every field it
//! collected through the schema's setter table, so a stream that does not
//! register a field rejects it instead of silently dropping it.

use std::collections::BTreeMap;

use annalist_core::{ActorIdentity, AppError, AppResult, NonEmptyString};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{Level, Record, RecordParams, RecordType, TargetRef};

/// Field tags understood by the record builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Record type.
    Type,
    /// Severity.
    Level,
    /// Message template.
    Message,
    /// Free-text note.
    Note,
    /// Event key.
    Event,
    /// Target reference.
    Target,
    /// Occurrence timestamp.
    Date,
    /// Authenticated actor.
    Owner,
    /// Completion flag.
    Finished,
    /// Display parameters.
    Params,
}

impl FieldKind {
    /// Fields that must be present before a record can be created.
    pub const REQUIRED: [FieldKind; 3] = [FieldKind::Event, FieldKind::Message, FieldKind::Date];

    /// Every known field.
    pub const ALL: [FieldKind; 10] = [
        FieldKind::Type,
        FieldKind::Level,
        FieldKind::Message,
        FieldKind::Note,
        FieldKind::Event,
        FieldKind::Target,
        FieldKind::Date,
        FieldKind::Owner,
        FieldKind::Finished,
        FieldKind::Params,
    ];

    /// Returns the field name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::Level => "level",
            Self::Message => "message",
            Self::Note => "note",
            Self::Event => "event",
            Self::Target => "target",
            Self::Date => "date",
            Self::Owner => "owner",
            Self::Finished => "finished",
            Self::Params => "params",
        }
    }

    /// Parses a field name case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A field value collected by the record builder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordField {
    /// Record type.
    Type(RecordType),
    /// Severity.
    Level(Level),
    /// Message template.
    Message(String),
    /// Free-text note.
    Note(Option<String>),
    /// Event key.
    Event(String),
    /// Target reference.
    Target(TargetRef),
    /// Occurrence timestamp.
    Date(DateTime<Utc>),
    /// Authenticated actor.
    Owner(Option<ActorIdentity>),
    /// Completion flag.
    Finished(bool),
    /// Display parameters.
    Params(RecordParams),
}

impl RecordField {
    /// Returns the tag of this field.
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Type(_) => FieldKind::Type,
            Self::Level(_) => FieldKind::Level,
            Self::Message(_) => FieldKind::Message,
            Self::Note(_) => FieldKind::Note,
            Self::Event(_) => FieldKind::Event,
            Self::Target(_) => FieldKind::Target,
            Self::Date(_) => FieldKind::Date,
            Self::Owner(_) => FieldKind::Owner,
            Self::Finished(_) => FieldKind::Finished,
            Self::Params(_) => FieldKind::Params,
        }
    }
}

/// Applies one field value to a record.
pub type Setter = fn(&mut Record, RecordField);

fn standard_setter(kind: FieldKind) -> Setter {
    match kind {
        FieldKind::Type => |record, field| {
            if let RecordField::Type(value) = field {
                record.set_type(value);
            }
        },
        FieldKind::Level => |record, field| {
            if let RecordField::Level(value) = field {
                record.set_level(value);
            }
        },
        FieldKind::Message => |record, field| {
            if let RecordField::Message(value) = field {
                record.set_message(value);
            }
        },
        FieldKind::Note => |record, field| {
            if let RecordField::Note(value) = field {
                record.set_note(value);
            }
        },
        FieldKind::Event => |record, field| {
            if let RecordField::Event(value) = field {
                record.set_event(value);
            }
        },
        FieldKind::Target => |record, field| {
            if let RecordField::Target(value) = field {
                record.set_target(value);
            }
        },
        FieldKind::Date => |record, field| {
            if let RecordField::Date(value) = field {
                record.set_date(value);
            }
        },
        FieldKind::Owner => |record, field| {
            if let RecordField::Owner(value) = field {
                record.set_owner(value);
            }
        },
        FieldKind::Finished => |record, field| {
            if let RecordField::Finished(value) = field {
                record.set_finished(value);
            }
        },
        FieldKind::Params => |record, field| {
            if let RecordField::Params(value) = field {
                record.set_params(value);
            }
        },
    }
}

/// Named record stream with its setter table.
#[derive(Debug, Clone)]
pub struct RecordSchema {
    name: NonEmptyString,
    setters: BTreeMap<FieldKind, Setter>,
}

impl RecordSchema {
    /// Creates a schema accepting every record field.
    pub fn standard(name: impl Into<String>) -> AppResult<Self> {
        FieldKind::ALL
            .into_iter()
            .try_fold(Self::builder(name)?, RecordSchemaBuilder::allow)
            .map(RecordSchemaBuilder::build)
    }

    /// Starts a schema that accepts only the fields registered on the builder.
    pub fn builder(name: impl Into<String>) -> AppResult<RecordSchemaBuilder> {
        Ok(RecordSchemaBuilder {
            name: NonEmptyString::new(name)?,
            setters: BTreeMap::new(),
        })
    }

    /// Returns the stream name records are written into.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the setter for a field, if the schema accepts it.
    #[must_use]
    pub fn setter(&self, kind: FieldKind) -> Option<Setter> {
        self.setters.get(&kind).copied()
    }

    /// Returns whether the schema accepts a field.
    #[must_use]
    pub fn accepts(&self, kind: FieldKind) -> bool {
        self.setters.contains_key(&kind)
    }
}

/// Registers the fields of a [`RecordSchema`].
#[derive(Debug)]
pub struct RecordSchemaBuilder {
    name: NonEmptyString,
    setters: BTreeMap<FieldKind, Setter>,
}

impl RecordSchemaBuilder {
    /// Registers the standard setter for a field.
    pub fn allow(self, kind: FieldKind) -> AppResult<Self> {
        self.allow_with(kind, standard_setter(kind))
    }

    /// Registers a custom setter for a field.
    pub fn allow_with(mut self, kind: FieldKind, setter: Setter) -> AppResult<Self> {
        if self.setters.insert(kind, setter).is_some() {
            return Err(AppError::Validation(format!(
                "field '{kind}' is already registered on record schema '{}'",
                self.name
            )));
        }

        Ok(self)
    }

    /// Finishes the schema.
    ///
    /// Event and message are constructor arguments of every record, so their
    /// setters are always registered.
    #[must_use]
    pub fn build(mut self) -> RecordSchema {
        for kind in [FieldKind::Event, FieldKind::Message] {
            self.setters
                .entry(kind)
                .or_insert_with(|| standard_setter(kind));
        }

        RecordSchema {
            name: self.name,
            setters: self.setters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldKind, RecordField, RecordSchema};
    use crate::{Level, Record};

    #[test]
    fn standard_schema_accepts_every_field() {
        let schema = RecordSchema::standard("activity");
        assert!(schema.is_ok());

        let schema = schema.ok();
        assert!(
            FieldKind::ALL
                .iter()
                .all(|kind| schema.as_ref().is_some_and(|schema| schema.accepts(*kind)))
        );
    }

    #[test]
    fn partial_schema_rejects_unregistered_fields() {
        let schema = RecordSchema::builder("audit")
            .and_then(|builder| builder.allow(FieldKind::Date))
            .map(|builder| builder.build());
        let Ok(schema) = schema else {
            panic!("schema should build");
        };

        assert!(schema.accepts(FieldKind::Event));
        assert!(schema.accepts(FieldKind::Date));
        assert!(!schema.accepts(FieldKind::Finished));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let schema = RecordSchema::builder("audit")
            .and_then(|builder| builder.allow(FieldKind::Level))
            .and_then(|builder| builder.allow(FieldKind::Level));
        assert!(schema.is_err());
    }

    #[test]
    fn blank_schema_name_is_rejected() {
        assert!(RecordSchema::standard("  ").is_err());
    }

    #[test]
    fn setter_applies_field_to_record() {
        let Ok(schema) = RecordSchema::standard("activity") else {
            panic!("schema should build");
        };
        let mut record = Record::new("activity", "create", "created");

        if let Some(setter) = schema.setter(FieldKind::Level) {
            setter(&mut record, RecordField::Level(Level::Danger));
        }

        assert_eq!(record.level(), Level::Danger);
    }

    #[test]
    fn field_names_parse_case_insensitively() {
        assert_eq!(FieldKind::parse("Note"), Some(FieldKind::Note));
        assert_eq!(FieldKind::parse("unknown"), None);
    }
}
