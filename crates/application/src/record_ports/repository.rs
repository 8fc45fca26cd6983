use std::sync::Arc;

use annalist_core::AppResult;
use annalist_domain::{DateWindow, Record, TargetRef};
use async_trait::async_trait;

use super::TrackedEntity;

/// Lookup criteria for already persisted records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    /// Content hash to match.
    pub hash: String,
    /// Restrict matches to records dated inside this window.
    pub window: Option<DateWindow>,
    /// Restrict matches to records that are not finished.
    pub unfinished_only: bool,
}

impl RecordQuery {
    /// Matches any record with the given hash.
    #[must_use]
    pub fn by_hash(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            window: None,
            unfinished_only: false,
        }
    }

    /// Returns whether a record satisfies the query.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        record.hash() == self.hash
            && self
                .window
                .is_none_or(|window| window.contains(record.date()))
            && (!self.unfinished_only || !record.is_finished())
    }
}

/// Storage port for audit records.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Persists and commits one record.
    async fn persist(&self, record: Record) -> AppResult<()>;

    /// Persists and commits records as a single all-or-nothing transaction.
    async fn persist_batch(&self, records: Vec<Record>) -> AppResult<()>;

    /// Returns one record matching the query, if any.
    async fn find_one(&self, query: RecordQuery) -> AppResult<Option<Record>>;
}

/// Resolves a record target back into a live entity reference.
#[async_trait]
pub trait TargetResolver: Send + Sync {
    /// Returns the entity identified by the target's type and identity.
    async fn resolve(&self, target: &TargetRef) -> AppResult<Option<Arc<dyn TrackedEntity>>>;
}
