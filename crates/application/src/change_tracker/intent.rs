use std::collections::HashMap;
use std::sync::Arc;

use annalist_domain::{Action, ChangeSet, TargetIdentity};

use crate::{ObjectHandle, TrackedEntity};

pub(super) type IntentParts = (
    Arc<dyn TrackedEntity>,
    Action,
    ChangeSet,
    Option<TargetIdentity>,
);

/// Classified, diffed and policy-filtered change of one staged object.
#[derive(Clone)]
pub struct ChangeIntent {
    handle: ObjectHandle,
    entity: Arc<dyn TrackedEntity>,
    action: Action,
    changes: ChangeSet,
    identity: Option<TargetIdentity>,
}

impl ChangeIntent {
    pub(super) fn new(
        handle: ObjectHandle,
        entity: Arc<dyn TrackedEntity>,
        action: Action,
        changes: ChangeSet,
    ) -> Self {
        let identity = entity.identity();
        let changes = match action {
            Action::Create => changes.into_new_values(),
            Action::Update | Action::Delete => changes,
        };

        Self {
            handle,
            entity,
            action,
            changes,
            identity,
        }
    }

    /// Returns the host handle of the target object.
    #[must_use]
    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    /// Returns the target object.
    #[must_use]
    pub fn entity(&self) -> &Arc<dyn TrackedEntity> {
        &self.entity
    }

    /// Returns the classification.
    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    /// Returns the filtered change set.
    #[must_use]
    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// Returns the target identity captured when the intent was buffered.
    #[must_use]
    pub fn identity(&self) -> Option<&TargetIdentity> {
        self.identity.as_ref()
    }

    pub(super) fn into_parts(self) -> IntentParts {
        (self.entity, self.action, self.changes, self.identity)
    }

    /// Folds a later intent for the same object into this one.
    fn absorb(&mut self, later: ChangeIntent) {
        self.action = self.action.coalesce(later.action);
        self.changes.merge(later.changes);
        if self.action == Action::Create {
            self.changes = std::mem::take(&mut self.changes).into_new_values();
        }
        if later.identity.is_some() {
            self.identity = later.identity;
        }
        self.entity = later.entity;
    }
}

impl std::fmt::Debug for ChangeIntent {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ChangeIntent")
            .field("handle", &self.handle)
            .field("entity_type", &self.entity.entity_type())
            .field("action", &self.action)
            .field("changes", &self.changes)
            .field("identity", &self.identity)
            .finish()
    }
}

/// Intents of one commit cycle in buffering order, one per object.
#[derive(Debug, Default)]
pub(super) struct IntentBuffer {
    intents: Vec<ChangeIntent>,
    positions: HashMap<ObjectHandle, usize>,
}

impl IntentBuffer {
    /// Buffers an intent; returns `true` when it was coalesced into an
    /// existing one.
    pub(super) fn push(&mut self, intent: ChangeIntent) -> bool {
        match self.positions.get(&intent.handle) {
            Some(position) => {
                self.intents[*position].absorb(intent);
                true
            }
            None => {
                self.positions.insert(intent.handle, self.intents.len());
                self.intents.push(intent);
                false
            }
        }
    }

    pub(super) fn len(&self) -> usize {
        self.intents.len()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    pub(super) fn snapshot(&self) -> Vec<ChangeIntent> {
        self.intents.clone()
    }

    pub(super) fn drain(&mut self) -> Vec<ChangeIntent> {
        self.positions.clear();
        std::mem::take(&mut self.intents)
    }

    pub(super) fn clear(&mut self) {
        self.positions.clear();
        self.intents.clear();
    }
}
