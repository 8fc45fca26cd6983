//! Automatic audit records for changes committed through the host engine.
//!
//! The tracker listens to the host's commit hooks. Before a commit it
//! classifies every staged object, computes the field-level diff, applies the
//! override policies and buffers one intent per object. After the commit it
//! turns the buffered intents into records and writes them as one batch.
//!
//! Writing that batch may itself go through the host and fire the hooks
//! again; while the tracker is flushing those nested calls are ignored.

mod config;
mod intent;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use annalist_core::ActorIdentity;
use annalist_domain::{Action, ChangeSet, FieldChange, PolicyRegistry, Record, TargetRef};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::{
    ActorProvider, Chronicler, CommitListener, ObjectHandle, RecordResult, StagedCollection,
    StagedEntity, UnitOfWork,
};

pub use config::{DEFAULT_MESSAGE_TEMPLATE, TrackerConfig};
pub use intent::ChangeIntent;

use intent::IntentBuffer;

/// Phase of the tracker's commit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Accepting hook calls.
    Idle,
    /// Writing buffered intents; hook calls are ignored.
    Committing,
}

impl TrackerState {
    /// Returns the stable state identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Committing => "committing",
        }
    }
}

#[derive(Debug)]
struct TrackerCycle {
    state: TrackerState,
    intents: IntentBuffer,
    ignored: HashSet<ObjectHandle>,
}

/// Commit listener that records every tracked change.
pub struct ChangeTracker {
    chronicler: Chronicler,
    policies: Arc<PolicyRegistry>,
    config: TrackerConfig,
    owner: Option<ActorIdentity>,
    cycle: Mutex<TrackerCycle>,
}

impl ChangeTracker {
    /// Creates a tracker writing through `chronicler`.
    ///
    /// The actor is resolved once; every record the tracker writes carries it
    /// as owner.
    #[must_use]
    pub fn new(
        chronicler: Chronicler,
        policies: Arc<PolicyRegistry>,
        config: TrackerConfig,
        actor_provider: &dyn ActorProvider,
    ) -> Self {
        Self {
            chronicler,
            policies,
            config,
            owner: actor_provider.current_actor(),
            cycle: Mutex::new(TrackerCycle {
                state: TrackerState::Idle,
                intents: IntentBuffer::default(),
                ignored: HashSet::new(),
            }),
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub fn state(&self) -> TrackerState {
        self.cycle().state
    }

    /// Returns the buffered intents in buffering order.
    #[must_use]
    pub fn pending_intents(&self) -> Vec<ChangeIntent> {
        self.cycle().intents.snapshot()
    }

    /// Returns the owner attached to tracked records.
    #[must_use]
    pub fn owner(&self) -> Option<&ActorIdentity> {
        self.owner.as_ref()
    }

    /// Opts one object out of (or back into) the next flush.
    pub fn set_ignored(&self, handle: ObjectHandle, ignored: bool) {
        let mut cycle = self.cycle();
        if ignored {
            cycle.ignored.insert(handle);
        } else {
            cycle.ignored.remove(&handle);
        }
    }

    /// Returns whether an object is opted out of the next flush.
    #[must_use]
    pub fn is_ignored(&self, handle: ObjectHandle) -> bool {
        self.cycle().ignored.contains(&handle)
    }

    fn cycle(&self) -> MutexGuard<'_, TrackerCycle> {
        self.cycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn buffer(
        &self,
        intents: &mut IntentBuffer,
        action: Action,
        staged: StagedEntity,
        mut changes: ChangeSet,
    ) {
        let entity_type = staged.entity.entity_type().to_owned();
        if self.policies.is_type_ignored(entity_type.as_str()) {
            trace!(entity_type = %entity_type, handle = %staged.handle, "entity type ignored");
            return;
        }
        if entity_type == self.chronicler.entity_name() {
            return;
        }

        if action == Action::Delete && changes.is_empty() {
            changes = staged.entity.audit_snapshot();
        }
        self.policies.apply(entity_type.as_str(), &mut changes);
        if changes.is_empty() {
            trace!(entity_type = %entity_type, handle = %staged.handle, "no auditable changes");
            return;
        }

        let coalesced = intents.push(ChangeIntent::new(
            staged.handle,
            staged.entity,
            action,
            changes,
        ));
        trace!(
            entity_type = %entity_type,
            action = %action,
            coalesced,
            "change intent buffered"
        );
    }

    fn build_record(&self, intent: ChangeIntent) -> RecordResult<Record> {
        let (entity, action, changes, identity) = intent.into_parts();
        let entity_type = entity.entity_type();
        let message = self.config.render_message(entity_type, action);

        let mut params = changes.into_params();
        if let Some(extra) = entity.record_params(Some(action)) {
            params.extend(extra);
        }

        let target = entity.record_target().unwrap_or_else(|| {
            TargetRef::new(entity_type, identity.or_else(|| entity.identity()))
        });

        params
            .into_iter()
            .fold(
                self.chronicler
                    .create_record(action.as_str(), message.as_str(), Default::default()),
                |builder, (name, value)| builder.with_param(name, value),
            )
            .with_target_ref(target)
            .with_level(action.level())
            .with_owner(self.owner.clone())
            .with_finished(true)
            .create()
    }

    fn begin_flush(&self) -> Option<(CommitGuard<'_>, Vec<ChangeIntent>)> {
        let mut cycle = self.cycle();
        if cycle.state == TrackerState::Committing {
            trace!("post-commit ignored while committing");
            return None;
        }
        if cycle.intents.is_empty() {
            return None;
        }

        cycle.state = TrackerState::Committing;
        let ignored = std::mem::take(&mut cycle.ignored);
        let intents = cycle
            .intents
            .drain()
            .into_iter()
            .filter(|intent| !ignored.contains(&intent.handle()))
            .collect();

        Some((CommitGuard { tracker: self }, intents))
    }
}

#[async_trait]
impl CommitListener for ChangeTracker {
    fn pre_commit(&self, unit_of_work: &dyn UnitOfWork) {
        let mut cycle = self.cycle();
        if cycle.state == TrackerState::Committing {
            trace!("pre-commit ignored while committing");
            return;
        }

        let staged = [
            (Action::Create, unit_of_work.staged_insertions()),
            (Action::Update, unit_of_work.staged_updates()),
            (Action::Delete, unit_of_work.staged_deletions()),
        ];
        for (action, entities) in staged {
            for entity in entities {
                let changes = unit_of_work.change_set(entity.handle);
                self.buffer(&mut cycle.intents, action, entity, changes);
            }
        }

        for collection in unit_of_work.staged_collections() {
            let changes = collection_changes(unit_of_work, &collection);
            self.buffer(&mut cycle.intents, Action::Update, collection.owner, changes);
        }

        debug!(pending = cycle.intents.len(), "pre-commit classified staged changes");
    }

    async fn post_commit(&self) -> RecordResult<()> {
        let Some((_guard, intents)) = self.begin_flush() else {
            return Ok(());
        };

        let records = intents
            .into_iter()
            .map(|intent| self.build_record(intent))
            .collect::<RecordResult<Vec<_>>>()?;
        let count = records.len();

        self.chronicler
            .record_batch(records)
            .await
            .inspect_err(|error| warn!(error = %error, "tracked changes were not recorded"))?;

        debug!(count, "tracked changes recorded");
        Ok(())
    }
}

/// Returns the tracker to idle when a flush ends, however it ends.
struct CommitGuard<'a> {
    tracker: &'a ChangeTracker,
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        let mut cycle = self.tracker.cycle();
        cycle.state = TrackerState::Idle;
        cycle.intents.clear();
        cycle.ignored.clear();
    }
}

/// Collection membership changes count as an update of the owner, with the
/// collection field reported as an `(old, new)` member pair.
fn collection_changes(unit_of_work: &dyn UnitOfWork, collection: &StagedCollection) -> ChangeSet {
    let mut changes = ChangeSet::new();
    let current = if collection.deleted {
        Vec::new()
    } else {
        collection.current.clone()
    };
    changes.insert(
        collection.field.as_str(),
        FieldChange::pair(
            Value::Array(collection.snapshot.clone()),
            Value::Array(current),
        ),
    );

    let mut owner_changes = unit_of_work.change_set(collection.owner.handle);
    owner_changes.remove(collection.field.as_str());
    changes.merge(owner_changes);
    changes
}
