use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;

use annalist_core::{ActorIdentity, AppError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::params::{self, RecordParams};

/// Number of hex characters kept from the content digest.
pub const RECORD_HASH_LENGTH: usize = 16;

/// Informational or actionable record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// Something happened; nothing to resolve.
    #[default]
    Log,
    /// Something happened and somebody has to act on it.
    Todo,
}

impl RecordType {
    /// Returns a stable storage value for this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Todo => "todo",
        }
    }

    /// Returns the level used when presenting the type itself.
    #[must_use]
    pub fn level(&self) -> Level {
        match self {
            Self::Log => Level::Warning,
            Self::Todo => Level::Info,
        }
    }

    /// Returns the icon name used when presenting the type.
    #[must_use]
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Log => "fa-plus-square",
            Self::Todo => "fa-minus-square",
        }
    }
}

impl FromStr for RecordType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "log" => Ok(Self::Log),
            "todo" => Ok(Self::Todo),
            _ => Err(AppError::Validation(format!(
                "unknown record type value '{value}'"
            ))),
        }
    }
}

/// Severity classification of a record, independent of its type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Primary emphasis.
    Primary,
    /// Neutral, the default.
    #[default]
    Secondary,
    /// Successful outcome.
    Success,
    /// Destructive or failed outcome.
    Danger,
    /// Needs attention.
    Warning,
    /// Informational.
    Info,
    /// Low emphasis.
    Light,
    /// High contrast.
    Dark,
}

impl Level {
    /// Returns a stable storage value for this level.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Success => "success",
            Self::Danger => "danger",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

impl FromStr for Level {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "primary" => Ok(Self::Primary),
            "secondary" => Ok(Self::Secondary),
            "success" => Ok(Self::Success),
            "danger" => Ok(Self::Danger),
            "warning" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            _ => Err(AppError::Validation(format!("unknown level value '{value}'"))),
        }
    }
}

/// Identity value of a record target: a scalar or a composite key.
///
/// Stored as plain JSON. Objects always read back as [`TargetIdentity::Composite`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetIdentity {
    /// Multi-column identity keyed by field name.
    Composite(BTreeMap<String, Value>),
    /// Single-column identity.
    Scalar(Value),
}

impl From<i64> for TargetIdentity {
    fn from(value: i64) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<&str> for TargetIdentity {
    fn from(value: &str) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<Uuid> for TargetIdentity {
    fn from(value: Uuid) -> Self {
        Self::Scalar(Value::from(value.to_string()))
    }
}

impl std::fmt::Display for TargetIdentity {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(Value::String(text)) => formatter.write_str(text),
            Self::Scalar(value) => write!(formatter, "{value}"),
            Self::Composite(fields) => {
                let rendered = fields
                    .iter()
                    .map(|(name, value)| match value {
                        Value::String(text) => format!("{name}={text}"),
                        other => format!("{name}={other}"),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                formatter.write_str(rendered.as_str())
            }
        }
    }
}

/// Reference to the entity a record is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    entity_type: String,
    identity: Option<TargetIdentity>,
}

impl TargetRef {
    /// Creates a target reference.
    #[must_use]
    pub fn new(entity_type: impl Into<String>, identity: Option<TargetIdentity>) -> Self {
        Self {
            entity_type: entity_type.into(),
            identity,
        }
    }

    /// Returns the target type identifier.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        self.entity_type.as_str()
    }

    /// Returns the target identity, if the target had one.
    #[must_use]
    pub fn identity(&self) -> Option<&TargetIdentity> {
        self.identity.as_ref()
    }
}

/// Storage representation of a record, used by repository adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordParts {
    /// Record identifier.
    pub id: Uuid,
    /// Name of the record schema the record belongs to.
    pub entity: String,
    /// Record type.
    pub record_type: RecordType,
    /// Event key.
    pub event: String,
    /// Message template.
    pub message: String,
    /// Display parameters.
    pub params: RecordParams,
    /// Target reference.
    pub target: Option<TargetRef>,
    /// Authenticated actor.
    pub owner: Option<ActorIdentity>,
    /// Occurrence timestamp.
    pub date: DateTime<Utc>,
    /// Severity.
    pub level: Level,
    /// Free-text annotation.
    pub note: Option<String>,
    /// Completion flag.
    pub finished: bool,
    /// Content hash if it was already computed.
    pub hash: Option<String>,
}

/// Audit record assembled by the record builder and persisted once.
#[derive(Debug, Clone)]
pub struct Record {
    id: Uuid,
    entity: String,
    record_type: RecordType,
    event: String,
    message: String,
    params: RecordParams,
    target: Option<TargetRef>,
    owner: Option<ActorIdentity>,
    date: DateTime<Utc>,
    level: Level,
    note: Option<String>,
    finished: bool,
    hash: OnceLock<String>,
}

impl Record {
    /// Creates a record dated now with default type and level.
    #[must_use]
    pub fn new(entity: impl Into<String>, event: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity: entity.into(),
            record_type: RecordType::default(),
            event: event.into(),
            message: message.into(),
            params: RecordParams::new(),
            target: None,
            owner: None,
            date: Utc::now(),
            level: Level::default(),
            note: None,
            finished: false,
            hash: OnceLock::new(),
        }
    }

    /// Rebuilds a persisted record.
    #[must_use]
    pub fn from_parts(parts: RecordParts) -> Self {
        let hash = OnceLock::new();
        if let Some(stored) = parts.hash {
            let _ = hash.set(stored);
        }

        Self {
            id: parts.id,
            entity: parts.entity,
            record_type: parts.record_type,
            event: parts.event,
            message: parts.message,
            params: parts.params,
            target: parts.target,
            owner: parts.owner,
            date: parts.date,
            level: parts.level,
            note: parts.note,
            finished: parts.finished,
            hash,
        }
    }

    /// Splits the record into its storage representation, computing the hash.
    #[must_use]
    pub fn to_parts(&self) -> RecordParts {
        RecordParts {
            id: self.id,
            entity: self.entity.clone(),
            record_type: self.record_type,
            event: self.event.clone(),
            message: self.message.clone(),
            params: self.params.clone(),
            target: self.target.clone(),
            owner: self.owner.clone(),
            date: self.date,
            level: self.level,
            note: self.note.clone(),
            finished: self.finished,
            hash: Some(self.hash().to_owned()),
        }
    }

    /// Returns the record identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the record schema name.
    #[must_use]
    pub fn entity(&self) -> &str {
        self.entity.as_str()
    }

    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// Sets the record type.
    pub fn set_type(&mut self, record_type: RecordType) {
        self.record_type = record_type;
    }

    /// Returns the event key.
    #[must_use]
    pub fn event(&self) -> &str {
        self.event.as_str()
    }

    /// Sets the event key.
    pub fn set_event(&mut self, event: impl Into<String>) {
        self.event = event.into();
    }

    /// Returns the raw message template.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Sets the message template.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    /// Returns the message with `{token}` placeholders substituted.
    #[must_use]
    pub fn message_formatted(&self) -> String {
        let tokens = params::tokenize(&self.params_unified());
        params::render(self.message.as_str(), &tokens)
    }

    /// Returns the stored parameters.
    #[must_use]
    pub fn params(&self) -> &RecordParams {
        &self.params
    }

    /// Returns the parameters flattened into dotted keys.
    #[must_use]
    pub fn params_unified(&self) -> BTreeMap<String, Value> {
        params::flatten(&self.params)
    }

    /// Replaces all parameters.
    pub fn set_params(&mut self, params: RecordParams) {
        self.params = RecordParams::new();
        self.add_params(params);
    }

    /// Adds parameters; keys already present keep their value.
    pub fn add_params(&mut self, params: RecordParams) {
        for (key, value) in params::scalarize(params) {
            self.params.entry(key).or_insert(value);
        }
    }

    /// Returns the target reference.
    #[must_use]
    pub fn target(&self) -> Option<&TargetRef> {
        self.target.as_ref()
    }

    /// Sets the target reference.
    pub fn set_target(&mut self, target: TargetRef) {
        self.target = Some(target);
    }

    /// Returns the actor that caused the record.
    #[must_use]
    pub fn owner(&self) -> Option<&ActorIdentity> {
        self.owner.as_ref()
    }

    /// Sets the actor that caused the record.
    pub fn set_owner(&mut self, owner: Option<ActorIdentity>) {
        self.owner = owner;
    }

    /// Returns the occurrence timestamp.
    #[must_use]
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// Sets the occurrence timestamp.
    pub fn set_date(&mut self, date: DateTime<Utc>) {
        self.date = date;
    }

    /// Returns the severity.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    /// Sets the severity.
    pub fn set_level(&mut self, level: Level) {
        self.level = level;
    }

    /// Returns the note.
    #[must_use]
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Sets the note; empty notes are stored as `None`.
    pub fn set_note(&mut self, note: Option<String>) {
        self.note = note.filter(|value| !value.is_empty());
    }

    /// Returns whether the record is finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Sets the completion flag.
    pub fn set_finished(&mut self, finished: bool) {
        self.finished = finished;
    }

    /// Resolves an open todo.
    pub fn mark_finished(&mut self) {
        self.finished = true;
    }

    /// Returns whether this is an open todo.
    #[must_use]
    pub fn is_finishable(&self) -> bool {
        self.record_type == RecordType::Todo && !self.finished
    }

    /// Returns the content hash, computing it on first use.
    ///
    /// Once computed the hash never changes, even if fields are set later.
    #[must_use]
    pub fn hash(&self) -> &str {
        self.hash
            .get_or_init(|| content_hash(self.to_string().as_str()))
            .as_str()
    }

    /// Returns whether the content hash has been computed.
    #[must_use]
    pub fn is_hashed(&self) -> bool {
        self.hash.get().is_some()
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (target, identity) = match &self.target {
            Some(target) => (
                target.entity_type(),
                target
                    .identity()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            ),
            None => ("", String::new()),
        };
        let params = serde_json::to_string(&self.params).unwrap_or_default();

        write!(
            formatter,
            "[{}, {}] {target}({identity}) {}: {} ({params})",
            self.record_type.as_str(),
            self.level.as_str(),
            self.event,
            self.message_formatted(),
        )
    }
}

fn content_hash(canonical: &str) -> String {
    use std::fmt::Write;

    let digest = Sha256::digest(canonical.as_bytes());
    digest
        .iter()
        .fold(String::with_capacity(64), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        })
        .chars()
        .take(RECORD_HASH_LENGTH)
        .collect()
}
