use annalist_core::ActorIdentity;
use annalist_domain::{Action, ChangeSet, RecordParams, TargetIdentity, TargetRef};

/// Entity managed by the host persistence engine that can appear in records.
///
/// The optional capabilities have no-op defaults; entity types override the
/// ones they support.
pub trait TrackedEntity: Send + Sync {
    /// Returns the stable type identifier, e.g. `"order"`.
    fn entity_type(&self) -> &str;

    /// Returns the identity value, if the entity has one yet.
    fn identity(&self) -> Option<TargetIdentity>;

    /// Extra record parameters supplied by the entity.
    ///
    /// `action` is `None` when the entity is attached as a target by hand.
    fn record_params(&self, _action: Option<Action>) -> Option<RecordParams> {
        None
    }

    /// Alternate target that records about this entity should point at.
    fn record_target(&self) -> Option<TargetRef> {
        None
    }

    /// Dump of the entity's own state, used when a deletion carries no diff.
    fn audit_snapshot(&self) -> ChangeSet {
        ChangeSet::new()
    }

    /// Returns the reference to this entity.
    fn target_ref(&self) -> TargetRef {
        TargetRef::new(self.entity_type(), self.identity())
    }
}

/// Source of the currently authenticated principal.
pub trait ActorProvider: Send + Sync {
    /// Returns the current principal, if anybody is authenticated.
    fn current_actor(&self) -> Option<ActorIdentity>;
}

/// Actor provider returning a fixed principal.
#[derive(Debug, Clone, Default)]
pub struct StaticActorProvider(Option<ActorIdentity>);

impl StaticActorProvider {
    /// Creates a provider for the given principal.
    #[must_use]
    pub fn new(actor: Option<ActorIdentity>) -> Self {
        Self(actor)
    }
}

impl ActorProvider for StaticActorProvider {
    fn current_actor(&self) -> Option<ActorIdentity> {
        self.0.clone()
    }
}
