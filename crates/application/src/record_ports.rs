mod repository;
mod tracked;
mod unit_of_work;

pub use repository::{RecordQuery, RecordRepository, TargetResolver};
pub use tracked::{ActorProvider, StaticActorProvider, TrackedEntity};
pub use unit_of_work::{CommitListener, ObjectHandle, StagedCollection, StagedEntity, UnitOfWork};
