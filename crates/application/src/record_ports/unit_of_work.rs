use std::sync::Arc;

use annalist_domain::ChangeSet;
use async_trait::async_trait;
use serde_json::Value;

use super::TrackedEntity;
use crate::RecordResult;

/// Stable handle the host assigns to every object it manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
    /// Wraps a host-assigned handle value.
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ObjectHandle {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "#{}", self.0)
    }
}

/// Object staged for insertion, update or deletion.
#[derive(Clone)]
pub struct StagedEntity {
    /// Host handle of the object.
    pub handle: ObjectHandle,
    /// Live object reference.
    pub entity: Arc<dyn TrackedEntity>,
}

impl std::fmt::Debug for StagedEntity {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("StagedEntity")
            .field("handle", &self.handle)
            .field("entity_type", &self.entity.entity_type())
            .finish()
    }
}

/// Staged membership change of a collection owned by an entity.
#[derive(Debug, Clone)]
pub struct StagedCollection {
    /// Entity owning the collection.
    pub owner: StagedEntity,
    /// Field of the owner holding the collection.
    pub field: String,
    /// Members as of the last commit.
    pub snapshot: Vec<Value>,
    /// Members now.
    pub current: Vec<Value>,
    /// Whether the whole collection was dropped rather than modified.
    pub deleted: bool,
}

/// View of the host transaction that is about to be committed.
pub trait UnitOfWork {
    /// Objects staged for insertion, in staging order.
    fn staged_insertions(&self) -> Vec<StagedEntity>;

    /// Objects staged for update, in staging order.
    fn staged_updates(&self) -> Vec<StagedEntity>;

    /// Objects staged for deletion, in staging order.
    fn staged_deletions(&self) -> Vec<StagedEntity>;

    /// Collection membership changes, in staging order.
    fn staged_collections(&self) -> Vec<StagedCollection>;

    /// Field-level `(old, new)` change set computed by the host.
    fn change_set(&self, handle: ObjectHandle) -> ChangeSet;
}

/// Hooks the host invokes around each of its commits.
#[async_trait]
pub trait CommitListener: Send + Sync {
    /// Called before the host applies the staged changes.
    fn pre_commit(&self, unit_of_work: &dyn UnitOfWork);

    /// Called once the host transaction has durably completed.
    async fn post_commit(&self) -> RecordResult<()>;
}
