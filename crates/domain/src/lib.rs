//! Domain entities and invariants of the audit trail.

#![forbid(unsafe_code)]

mod action;
mod change;
pub mod params;
mod period;
mod policy;
mod record;
mod schema;

pub use action::Action;
pub use change::{ChangeSet, FieldChange};
pub use params::RecordParams;
pub use period::{DateWindow, Period};
pub use policy::{FieldPolicy, OverridePolicy, PolicyRegistry, PolicyTable, Strategy, TypePolicy};
pub use record::{
    Level, RECORD_HASH_LENGTH, Record, RecordParts, RecordType, TargetIdentity, TargetRef,
};
pub use schema::{FieldKind, RecordField, RecordSchema, RecordSchemaBuilder, Setter};
