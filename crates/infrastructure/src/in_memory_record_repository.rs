use annalist_application::{RecordQuery, RecordRepository};
use annalist_core::AppResult;
use annalist_domain::Record;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// In-memory record repository implementation.
#[derive(Debug, Default)]
pub struct InMemoryRecordRepository {
    records: RwLock<Vec<Record>>,
}

impl InMemoryRecordRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored record in write order.
    pub async fn records(&self) -> Vec<Record> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl RecordRepository for InMemoryRecordRepository {
    async fn persist(&self, record: Record) -> AppResult<()> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn persist_batch(&self, records: Vec<Record>) -> AppResult<()> {
        self.records.write().await.extend(records);
        Ok(())
    }

    async fn find_one(&self, query: RecordQuery) -> AppResult<Option<Record>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .rev()
            .find(|record| query.matches(record))
            .cloned())
    }
}
