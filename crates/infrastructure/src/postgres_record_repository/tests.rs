use annalist_application::{RecordQuery, RecordRepository};
use annalist_core::ActorIdentity;
use annalist_domain::{Level, Period, Record, TargetIdentity, TargetRef};
use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::PostgresRecordRepository;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres record tests: {error}");
    }

    Some(pool)
}

fn unique_entity() -> String {
    format!("activity_{}", Uuid::new_v4().simple())
}

fn record(entity: &str, message: &str) -> Record {
    let mut record = Record::new(entity, "sync", message);
    record.set_level(Level::Warning);
    record.set_target(TargetRef::new("order", Some(TargetIdentity::from(7))));
    record.set_owner(Some(ActorIdentity::new("alice").with_display_name("Alice")));
    record.add_params([("number".to_owned(), json!("A-7"))].into_iter().collect());
    record
}

#[tokio::test]
async fn persisted_records_round_trip_through_find_one() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let entity = unique_entity();
    let repository = PostgresRecordRepository::new(pool, entity.as_str());
    let written = record(entity.as_str(), "Sync {number} failed");

    assert!(repository.persist(written.clone()).await.is_ok());

    let found = repository
        .find_one(RecordQuery::by_hash(written.hash()))
        .await;
    let Ok(Some(found)) = found else {
        panic!("record should be found");
    };
    assert_eq!(found.id(), written.id());
    assert_eq!(found.hash(), written.hash());
    assert_eq!(found.level(), Level::Warning);
    assert_eq!(found.target(), written.target());
    assert_eq!(found.owner().map(ActorIdentity::display_name), Some("Alice"));
    assert_eq!(found.message_formatted(), "Sync A-7 failed");
}

#[tokio::test]
async fn find_one_honours_window_and_finished_filters() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let entity = unique_entity();
    let repository = PostgresRecordRepository::new(pool, entity.as_str());

    let mut old = record(entity.as_str(), "old");
    old.set_date(Utc::now() - Duration::days(10));
    let mut finished = record(entity.as_str(), "finished");
    finished.mark_finished();
    assert!(repository.persist_batch(vec![old.clone(), finished.clone()]).await.is_ok());

    let Ok(period) = Period::parse("-7 days") else {
        panic!("period should parse");
    };
    let window = Some(period.window(Utc::now()));

    let old_in_window = repository
        .find_one(RecordQuery {
            hash: old.hash().to_owned(),
            window,
            unfinished_only: true,
        })
        .await;
    assert!(matches!(old_in_window, Ok(None)));

    let finished_in_window = repository
        .find_one(RecordQuery {
            hash: finished.hash().to_owned(),
            window,
            unfinished_only: true,
        })
        .await;
    assert!(matches!(finished_in_window, Ok(None)));

    let finished_any = repository
        .find_one(RecordQuery::by_hash(finished.hash()))
        .await;
    assert!(matches!(finished_any, Ok(Some(_))));
}

#[tokio::test]
async fn failed_batch_writes_nothing() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let entity = unique_entity();
    let repository = PostgresRecordRepository::new(pool, entity.as_str());
    let first = record(entity.as_str(), "first");

    let result = repository
        .persist_batch(vec![first.clone(), first.clone()])
        .await;
    assert!(result.is_err());

    let found = repository.find_one(RecordQuery::by_hash(first.hash())).await;
    assert!(matches!(found, Ok(None)));
}
