//! In-memory persistence session that stages object changes and fires the
//! commit hooks around every commit.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use annalist_application::{
    CommitListener, ObjectHandle, RecordQuery, RecordRepository, StagedCollection, StagedEntity,
    TargetResolver, TrackedEntity, UnitOfWork,
};
use annalist_core::{AppError, AppResult};
use annalist_domain::params::to_param;
use annalist_domain::{ChangeSet, FieldChange, Record, TargetIdentity, TargetRef};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

type Fields = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectStatus {
    PendingInsert,
    Managed,
    PendingDelete,
}

struct ManagedObject {
    entity: Arc<dyn TrackedEntity>,
    status: ObjectStatus,
    committed: Fields,
    current: Fields,
    committed_collections: BTreeMap<String, Vec<Value>>,
    collections: BTreeMap<String, Option<Vec<Value>>>,
    record: Option<Record>,
}

impl ManagedObject {
    fn staged(&self, handle: ObjectHandle) -> StagedEntity {
        StagedEntity {
            handle,
            entity: Arc::clone(&self.entity),
        }
    }

    fn diff(&self) -> ChangeSet {
        let mut changes = ChangeSet::new();
        for (field, value) in &self.current {
            let old = self.committed.get(field).cloned().unwrap_or(Value::Null);
            if old != *value {
                changes.insert(field.as_str(), FieldChange::pair(old, value.clone()));
            }
        }
        changes
    }

    fn collection_changes(&self) -> Vec<(String, Vec<Value>, Option<Vec<Value>>)> {
        self.collections
            .iter()
            .filter_map(|(field, current)| {
                let snapshot = self
                    .committed_collections
                    .get(field)
                    .cloned()
                    .unwrap_or_default();
                match current {
                    Some(members) if *members == snapshot => None,
                    None if snapshot.is_empty() => None,
                    _ => Some((field.clone(), snapshot, current.clone())),
                }
            })
            .collect()
    }

    fn apply(&mut self) {
        self.status = ObjectStatus::Managed;
        self.committed = self.current.clone();
        let collections = std::mem::take(&mut self.collections);
        for (field, members) in collections {
            match members {
                Some(members) => {
                    self.committed_collections.insert(field, members);
                }
                None => {
                    self.committed_collections.remove(&field);
                }
            }
        }
    }
}

#[derive(Default)]
struct SessionState {
    next_handle: u64,
    objects: BTreeMap<ObjectHandle, ManagedObject>,
    records: Vec<Record>,
}

/// Changes staged in a session at the moment it commits.
#[derive(Debug, Default)]
struct PendingWork {
    insertions: Vec<StagedEntity>,
    updates: Vec<StagedEntity>,
    deletions: Vec<StagedEntity>,
    collections: Vec<StagedCollection>,
    change_sets: HashMap<ObjectHandle, ChangeSet>,
}

impl PendingWork {
    fn is_empty(&self) -> bool {
        self.insertions.is_empty()
            && self.updates.is_empty()
            && self.deletions.is_empty()
            && self.collections.is_empty()
    }
}

impl UnitOfWork for PendingWork {
    fn staged_insertions(&self) -> Vec<StagedEntity> {
        self.insertions.clone()
    }

    fn staged_updates(&self) -> Vec<StagedEntity> {
        self.updates.clone()
    }

    fn staged_deletions(&self) -> Vec<StagedEntity> {
        self.deletions.clone()
    }

    fn staged_collections(&self) -> Vec<StagedCollection> {
        self.collections.clone()
    }

    fn change_set(&self, handle: ObjectHandle) -> ChangeSet {
        self.change_sets.get(&handle).cloned().unwrap_or_default()
    }
}

/// Session of an in-memory object store.
///
/// Objects are staged with [`InMemorySession::persist`],
/// [`InMemorySession::set_field`], [`InMemorySession::set_collection`] and
/// [`InMemorySession::remove`]; [`InMemorySession::commit`] applies them and
/// notifies the registered listeners before and after doing so.
///
/// The session also stores audit records, so records written from a
/// post-commit hook go through a commit of their own.
#[derive(Default)]
pub struct InMemorySession {
    state: Mutex<SessionState>,
    listeners: Mutex<Vec<Weak<dyn CommitListener>>>,
}

impl InMemorySession {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a commit listener.
    ///
    /// Only a weak reference is kept; a dropped listener stops receiving hooks.
    pub fn add_listener<L>(&self, listener: &Arc<L>)
    where
        L: CommitListener + 'static,
    {
        let listener: Arc<dyn CommitListener> = Arc::clone(listener) as Arc<dyn CommitListener>;
        self.listeners().push(Arc::downgrade(&listener));
    }

    /// Stages a new object with its initial field values.
    pub fn persist(
        &self,
        entity: Arc<dyn TrackedEntity>,
        fields: impl IntoIterator<Item = (String, Value)>,
    ) -> ObjectHandle {
        self.stage(entity, fields.into_iter().collect(), None)
    }

    /// Changes one field of a staged or managed object.
    pub fn set_field(
        &self,
        handle: ObjectHandle,
        field: &str,
        value: impl Into<Value>,
    ) -> AppResult<()> {
        let mut state = self.state();
        let object = live_object(&mut state, handle)?;
        object.current.insert(field.to_owned(), value.into());
        Ok(())
    }

    /// Replaces the members of a collection owned by an object.
    pub fn set_collection(
        &self,
        handle: ObjectHandle,
        field: &str,
        members: Vec<Value>,
    ) -> AppResult<()> {
        let mut state = self.state();
        let object = live_object(&mut state, handle)?;
        object.collections.insert(field.to_owned(), Some(members));
        Ok(())
    }

    /// Drops a whole collection owned by an object.
    pub fn clear_collection(&self, handle: ObjectHandle, field: &str) -> AppResult<()> {
        let mut state = self.state();
        let object = live_object(&mut state, handle)?;
        object.collections.insert(field.to_owned(), None);
        Ok(())
    }

    /// Stages an object for deletion.
    ///
    /// Removing an object that was never committed simply unstages it.
    pub fn remove(&self, handle: ObjectHandle) -> AppResult<()> {
        let mut state = self.state();
        let object = live_object(&mut state, handle)?;
        if object.status != ObjectStatus::PendingInsert {
            object.status = ObjectStatus::PendingDelete;
            return Ok(());
        }

        state.objects.remove(&handle);
        Ok(())
    }

    /// Returns the committed field values of a managed object.
    #[must_use]
    pub fn fields(&self, handle: ObjectHandle) -> Option<Fields> {
        self.state()
            .objects
            .get(&handle)
            .filter(|object| object.status != ObjectStatus::PendingInsert)
            .map(|object| object.committed.clone())
    }

    /// Returns every committed audit record in write order.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.state().records.clone()
    }

    /// Applies every staged change.
    ///
    /// Listeners see the staged changes before they are applied and are
    /// notified once the commit completed. A failing post-commit hook does
    /// not undo the commit; its error is returned after all hooks ran.
    pub async fn commit(&self) -> AppResult<()> {
        self.commit_scoped(None).await
    }

    /// Commits the staged changes of `scope` only, or of every object when
    /// `scope` is `None`.
    async fn commit_scoped(&self, scope: Option<&HashSet<ObjectHandle>>) -> AppResult<()> {
        let pending = self.pending_work(scope);
        if pending.is_empty() {
            return Ok(());
        }

        let listeners = self.live_listeners();
        for listener in &listeners {
            listener.pre_commit(&pending);
        }

        let applied = self.apply(&pending);
        debug!(
            insertions = pending.insertions.len(),
            updates = pending.updates.len(),
            deletions = pending.deletions.len(),
            records = applied,
            "session committed"
        );

        let mut first_error = None;
        for listener in &listeners {
            if let Err(error) = listener.post_commit().await {
                warn!(error = %error, "post-commit listener failed");
                first_error.get_or_insert(AppError::from(error));
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<Weak<dyn CommitListener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn live_listeners(&self) -> Vec<Arc<dyn CommitListener>> {
        let mut listeners = self.listeners();
        listeners.retain(|listener| listener.strong_count() > 0);
        listeners.iter().filter_map(Weak::upgrade).collect()
    }

    fn stage(
        &self,
        entity: Arc<dyn TrackedEntity>,
        fields: Fields,
        record: Option<Record>,
    ) -> ObjectHandle {
        let mut state = self.state();
        state.next_handle += 1;
        let handle = ObjectHandle::new(state.next_handle);
        state.objects.insert(
            handle,
            ManagedObject {
                entity,
                status: ObjectStatus::PendingInsert,
                committed: Fields::new(),
                current: fields,
                committed_collections: BTreeMap::new(),
                collections: BTreeMap::new(),
                record,
            },
        );
        handle
    }

    fn pending_work(&self, scope: Option<&HashSet<ObjectHandle>>) -> PendingWork {
        let state = self.state();
        let mut pending = PendingWork::default();

        for (handle, object) in &state.objects {
            if scope.is_some_and(|scope| !scope.contains(handle)) {
                continue;
            }
            match object.status {
                ObjectStatus::PendingInsert => {
                    pending.change_sets.insert(*handle, object.diff());
                    pending.insertions.push(object.staged(*handle));
                }
                ObjectStatus::PendingDelete => {
                    pending.deletions.push(object.staged(*handle));
                    continue;
                }
                ObjectStatus::Managed => {
                    let changes = object.diff();
                    if !changes.is_empty() {
                        pending.change_sets.insert(*handle, changes);
                        pending.updates.push(object.staged(*handle));
                    }
                }
            }

            for (field, snapshot, current) in object.collection_changes() {
                pending.collections.push(StagedCollection {
                    owner: object.staged(*handle),
                    field,
                    snapshot,
                    deleted: current.is_none(),
                    current: current.unwrap_or_default(),
                });
            }
        }

        pending
    }

    fn apply(&self, pending: &PendingWork) -> usize {
        let mut state = self.state();
        let SessionState {
            objects, records, ..
        } = &mut *state;
        let mut applied = 0;

        for staged in &pending.deletions {
            objects.remove(&staged.handle);
        }
        for staged in pending.insertions.iter().chain(&pending.updates) {
            if let Some(object) = objects.get_mut(&staged.handle) {
                object.apply();
                if let Some(record) = object.record.take() {
                    // stored records are not managed past their commit
                    objects.remove(&staged.handle);
                    records.push(record);
                    applied += 1;
                }
            }
        }
        for collection in &pending.collections {
            if let Some(object) = objects.get_mut(&collection.owner.handle) {
                object.apply();
            }
        }

        applied
    }
}

fn live_object(state: &mut SessionState, handle: ObjectHandle) -> AppResult<&mut ManagedObject> {
    match state.objects.get_mut(&handle) {
        Some(object) if object.status != ObjectStatus::PendingDelete => Ok(object),
        _ => Err(AppError::NotFound(format!("object {handle} is not managed"))),
    }
}

/// Audit record staged as an object of its own schema.
struct StoredRecord {
    entity: String,
    id: uuid::Uuid,
}

impl TrackedEntity for StoredRecord {
    fn entity_type(&self) -> &str {
        self.entity.as_str()
    }

    fn identity(&self) -> Option<TargetIdentity> {
        Some(TargetIdentity::from(self.id))
    }
}

fn record_fields(record: &Record) -> AppResult<Fields> {
    Ok(Fields::from([
        ("event".to_owned(), Value::from(record.event())),
        ("message".to_owned(), Value::from(record.message())),
        ("level".to_owned(), Value::from(record.level().as_str())),
        ("date".to_owned(), Value::from(record.date().to_rfc3339())),
        ("hash".to_owned(), Value::from(record.hash())),
        ("target".to_owned(), to_param(&record.target())?),
        ("owner".to_owned(), to_param(&record.owner())?),
    ]))
}

#[async_trait]
impl RecordRepository for InMemorySession {
    async fn persist(&self, record: Record) -> AppResult<()> {
        self.persist_batch(vec![record]).await
    }

    async fn persist_batch(&self, records: Vec<Record>) -> AppResult<()> {
        let mut scope = HashSet::with_capacity(records.len());
        for record in records {
            let entity = Arc::new(StoredRecord {
                entity: record.entity().to_owned(),
                id: record.id(),
            });
            let fields = record_fields(&record)?;
            scope.insert(self.stage(entity, fields, Some(record)));
        }

        self.commit_scoped(Some(&scope)).await
    }

    async fn find_one(&self, query: RecordQuery) -> AppResult<Option<Record>> {
        Ok(self
            .state()
            .records
            .iter()
            .rev()
            .find(|record| query.matches(record))
            .cloned())
    }
}

#[async_trait]
impl TargetResolver for InMemorySession {
    async fn resolve(&self, target: &TargetRef) -> AppResult<Option<Arc<dyn TrackedEntity>>> {
        Ok(self
            .state()
            .objects
            .values()
            .filter(|object| object.status != ObjectStatus::PendingInsert)
            .map(|object| &object.entity)
            .find(|entity| {
                entity.entity_type() == target.entity_type()
                    && entity.identity().as_ref() == target.identity()
            })
            .cloned())
    }
}
