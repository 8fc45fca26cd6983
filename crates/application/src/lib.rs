//! Application services and ports of the audit trail.
//!
//! [`Chronicler`] writes records explicitly, [`ChangeTracker`] derives them
//! from the host persistence engine's commits. Both depend on the ports in
//! this crate only; adapters live in the infrastructure crate.

#![forbid(unsafe_code)]

mod change_tracker;
mod chronicler;
mod record_builder;
mod record_error;
mod record_ports;

pub use change_tracker::{
    ChangeIntent, ChangeTracker, DEFAULT_MESSAGE_TEMPLATE, TrackerConfig, TrackerState,
};
pub use chronicler::{Chronicler, RecordInput};
pub use record_builder::RecordBuilder;
pub use record_error::{RecordError, RecordResult};
pub use record_ports::{
    ActorProvider, CommitListener, ObjectHandle, RecordQuery, RecordRepository, StagedCollection,
    StagedEntity, StaticActorProvider, TargetResolver, TrackedEntity, UnitOfWork,
};
