use std::sync::Arc;

use annalist_core::{AppError, AppResult};
use annalist_domain::{Record, RecordParams, RecordSchema, RecordType};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use tokio::sync::Mutex;

use super::Chronicler;
use crate::{RecordError, RecordQuery, RecordRepository};

#[derive(Default)]
struct FakeRepository {
    records: Mutex<Vec<Record>>,
    queries: Mutex<Vec<RecordQuery>>,
    fail_writes: bool,
}

impl FakeRepository {
    fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl RecordRepository for FakeRepository {
    async fn persist(&self, record: Record) -> AppResult<()> {
        if self.fail_writes {
            return Err(AppError::Internal("connection reset".to_owned()));
        }

        self.records.lock().await.push(record);
        Ok(())
    }

    async fn persist_batch(&self, records: Vec<Record>) -> AppResult<()> {
        if self.fail_writes {
            return Err(AppError::Internal("connection reset".to_owned()));
        }

        self.records.lock().await.extend(records);
        Ok(())
    }

    async fn find_one(&self, query: RecordQuery) -> AppResult<Option<Record>> {
        let found = self
            .records
            .lock()
            .await
            .iter()
            .find(|record| query.matches(record))
            .cloned();
        self.queries.lock().await.push(query);
        Ok(found)
    }
}

fn chronicler(repository: Arc<FakeRepository>) -> Chronicler {
    match RecordSchema::standard("activity") {
        Ok(schema) => Chronicler::new(schema, repository),
        Err(error) => panic!("standard schema should build: {error}"),
    }
}

fn params() -> RecordParams {
    RecordParams::from([("number".to_owned(), json!("A-1"))])
}

#[tokio::test]
async fn log_persists_log_record_with_formatted_message() {
    let repository = Arc::new(FakeRepository::default());
    let chronicler = chronicler(repository.clone());

    let result = chronicler
        .log("order.cancelled", "Order {number} cancelled", params())
        .await;
    assert!(result.is_ok());

    let records = repository.records.lock().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record_type(), RecordType::Log);
    assert_eq!(records[0].message_formatted(), "Order A-1 cancelled");
    assert!(records[0].is_hashed());
}

#[tokio::test]
async fn todo_persists_open_todo() {
    let repository = Arc::new(FakeRepository::default());
    let chronicler = chronicler(repository.clone());

    let result = chronicler.todo("invoice.overdue", "Chase payment", params()).await;
    let Ok(record) = result else {
        panic!("todo should be recorded");
    };

    assert_eq!(record.record_type(), RecordType::Todo);
    assert!(record.is_finishable());
    assert_eq!(repository.records.lock().await.len(), 1);
}

#[tokio::test]
async fn record_with_duplicate_in_period_fails_and_leaves_storage_unchanged() {
    let repository = Arc::new(FakeRepository::default());
    let chronicler = chronicler(repository.clone());

    let first = chronicler
        .record(chronicler.create_record("sync", "Sync failed", params()), Some("-7 days"))
        .await;
    let Ok(first) = first else {
        panic!("first record should be written");
    };

    let second = chronicler
        .record(chronicler.create_record("sync", "Sync failed", params()), Some("-7 days"))
        .await;
    match second {
        Err(RecordError::Exists { record, period }) => {
            assert_eq!(record.id(), first.id());
            assert_eq!(period, "-7 days");
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    assert_eq!(repository.records.lock().await.len(), 1);
}

#[tokio::test]
async fn finished_records_do_not_block_new_ones() {
    let repository = Arc::new(FakeRepository::default());
    let chronicler = chronicler(repository.clone());

    let builder = chronicler
        .create_record("sync", "Sync failed", params())
        .with_finished(true);
    assert!(chronicler.record(builder, None).await.is_ok());

    let again = chronicler
        .record(chronicler.create_record("sync", "Sync failed", params()), Some("-7 days"))
        .await;
    assert!(again.is_ok());
    assert_eq!(repository.records.lock().await.len(), 2);
}

#[tokio::test]
async fn is_recorded_respects_the_window() {
    let repository = Arc::new(FakeRepository::default());
    let chronicler = chronicler(repository.clone());

    let recent = chronicler
        .create_record("sync", "recent", params())
        .with_date(Utc::now() - Duration::days(6));
    let old = chronicler
        .create_record("sync", "old", params())
        .with_date(Utc::now() - Duration::days(9));
    assert!(chronicler.record(recent.clone(), None).await.is_ok());
    assert!(chronicler.record(old.clone(), None).await.is_ok());

    let Ok(recent) = recent.create() else {
        panic!("record should be valid");
    };
    let Ok(old) = old.create() else {
        panic!("record should be valid");
    };

    assert!(matches!(
        chronicler.is_recorded(&recent, Some("-7 days")).await,
        Ok(true)
    ));
    assert!(matches!(
        chronicler.is_recorded(&old, Some("-7 days")).await,
        Ok(false)
    ));
    assert!(matches!(chronicler.is_recorded(&old, None).await, Ok(true)));
}

#[tokio::test]
async fn forward_period_is_rejected_before_querying() {
    let repository = Arc::new(FakeRepository::default());
    let chronicler = chronicler(repository.clone());
    let Ok(record) = chronicler.create_record("sync", "x", params()).create() else {
        panic!("record should be valid");
    };

    let checked = chronicler.is_recorded(&record, Some("+1 days")).await;
    assert!(matches!(checked, Err(RecordError::PeriodNotValid { .. })));

    let written = chronicler.record(record, Some("+1 days")).await;
    assert!(matches!(written, Err(RecordError::PeriodNotValid { .. })));

    assert!(repository.queries.lock().await.is_empty());
    assert!(repository.records.lock().await.is_empty());
}

#[tokio::test]
async fn storage_failure_is_wrapped_with_record_and_cause() {
    let repository = Arc::new(FakeRepository::failing());
    let chronicler = chronicler(repository);

    let result = chronicler.log("sync", "Sync failed", params()).await;
    match result {
        Err(RecordError::Failed { record, source }) => {
            assert_eq!(record.event(), "sync");
            assert!(matches!(source, AppError::Internal(_)));
        }
        other => panic!("expected write failure, got {other:?}"),
    }
}

#[tokio::test]
async fn batch_failure_carries_every_record() {
    let repository = Arc::new(FakeRepository::failing());
    let chronicler = chronicler(repository);
    let records = ["a", "b"]
        .into_iter()
        .filter_map(|event| chronicler.create_record(event, "m", params()).create().ok())
        .collect::<Vec<_>>();

    let result = chronicler.record_batch(records).await;
    match result {
        Err(RecordError::BatchFailed { records, .. }) => assert_eq!(records.len(), 2),
        other => panic!("expected batch failure, got {other:?}"),
    }
}

#[tokio::test]
async fn record_errors_map_onto_app_errors() {
    let repository = Arc::new(FakeRepository::default());
    let chronicler = chronicler(repository);

    assert!(chronicler.log("sync", "x", params()).await.is_ok());
    let duplicate = chronicler
        .record(chronicler.create_record("sync", "x", params()), Some("-1 day"))
        .await;

    let Err(error) = duplicate else {
        panic!("duplicate should be rejected");
    };
    assert!(matches!(AppError::from(error), AppError::Conflict(_)));
}
