use std::str::FromStr;

use annalist_application::{RecordQuery, RecordRepository};
use annalist_core::{ActorIdentity, AppError, AppResult};
use annalist_domain::{Level, Record, RecordParams, RecordParts, RecordType, TargetIdentity, TargetRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::debug;

/// PostgreSQL-backed repository for the records of one record schema.
#[derive(Clone)]
pub struct PostgresRecordRepository {
    pool: PgPool,
    entity: String,
}

impl PostgresRecordRepository {
    /// Creates a repository for the schema `entity` with the provided pool.
    #[must_use]
    pub fn new(pool: PgPool, entity: impl Into<String>) -> Self {
        Self {
            pool,
            entity: entity.into(),
        }
    }

    async fn insert(
        transaction: &mut Transaction<'_, Postgres>,
        record: &Record,
    ) -> Result<(), sqlx::Error> {
        let parts = record.to_parts();
        let (target_type, target_identity) = match parts.target {
            Some(target) => (
                Some(target.entity_type().to_owned()),
                target.identity().cloned().map(Json),
            ),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO records (
                id,
                entity,
                record_type,
                event,
                message,
                params,
                target_type,
                target_identity,
                owner,
                occurred_at,
                level,
                note,
                finished,
                hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(parts.id)
        .bind(parts.entity)
        .bind(parts.record_type.as_str())
        .bind(parts.event)
        .bind(parts.message)
        .bind(Json(parts.params))
        .bind(target_type)
        .bind(target_identity)
        .bind(parts.owner.map(Json))
        .bind(parts.date)
        .bind(parts.level.as_str())
        .bind(parts.note)
        .bind(parts.finished)
        .bind(parts.hash.unwrap_or_default())
        .execute(&mut **transaction)
        .await?;

        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct RecordRow {
    id: uuid::Uuid,
    entity: String,
    record_type: String,
    event: String,
    message: String,
    params: Json<RecordParams>,
    target_type: Option<String>,
    target_identity: Option<Json<TargetIdentity>>,
    owner: Option<Json<ActorIdentity>>,
    occurred_at: DateTime<Utc>,
    level: String,
    note: Option<String>,
    finished: bool,
    hash: String,
}

impl RecordRow {
    fn into_record(self) -> AppResult<Record> {
        let record_type = RecordType::from_str(self.record_type.as_str()).map_err(|error| {
            AppError::Internal(format!("stored record '{}' is corrupt: {error}", self.id))
        })?;
        let level = Level::from_str(self.level.as_str()).map_err(|error| {
            AppError::Internal(format!("stored record '{}' is corrupt: {error}", self.id))
        })?;
        let target = self.target_type.map(|entity_type| {
            TargetRef::new(entity_type, self.target_identity.map(|identity| identity.0))
        });

        Ok(Record::from_parts(RecordParts {
            id: self.id,
            entity: self.entity,
            record_type,
            event: self.event,
            message: self.message,
            params: self.params.0,
            target,
            owner: self.owner.map(|owner| owner.0),
            date: self.occurred_at,
            level,
            note: self.note,
            finished: self.finished,
            hash: Some(self.hash),
        }))
    }
}

#[async_trait]
impl RecordRepository for PostgresRecordRepository {
    async fn persist(&self, record: Record) -> AppResult<()> {
        self.persist_batch(vec![record]).await
    }

    async fn persist_batch(&self, records: Vec<Record>) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin record transaction: {error}"))
        })?;

        for record in &records {
            Self::insert(&mut transaction, record)
                .await
                .map_err(|error| {
                    AppError::Internal(format!("failed to insert record '{}': {error}", record.id()))
                })?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit record transaction: {error}"))
        })?;

        debug!(entity = %self.entity, count = records.len(), "records inserted");
        Ok(())
    }

    async fn find_one(&self, query: RecordQuery) -> AppResult<Option<Record>> {
        let (window_start, window_end) = match query.window {
            Some(window) => (Some(window.start), Some(window.end)),
            None => (None, None),
        };

        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT
                id,
                entity,
                record_type,
                event,
                message,
                params,
                target_type,
                target_identity,
                owner,
                occurred_at,
                level,
                note,
                finished,
                hash
            FROM records
            WHERE entity = $1
                AND hash = $2
                AND ($3::TIMESTAMPTZ IS NULL OR occurred_at >= $3)
                AND ($4::TIMESTAMPTZ IS NULL OR occurred_at < $4)
                AND (NOT $5 OR finished = FALSE)
            ORDER BY occurred_at DESC
            LIMIT 1
            "#,
        )
        .bind(self.entity.as_str())
        .bind(query.hash)
        .bind(window_start)
        .bind(window_end)
        .bind(query.unfinished_only)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find record: {error}")))?;

        row.map(RecordRow::into_record).transpose()
    }
}

#[cfg(test)]
mod tests;
