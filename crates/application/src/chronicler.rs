//! Write path for one record stream.

use std::sync::Arc;

use annalist_core::AppError;
use annalist_domain::{Period, Record, RecordParams, RecordSchema, RecordType};
use chrono::Utc;
use tracing::{debug, info};

use crate::{
    RecordBuilder, RecordError, RecordQuery, RecordRepository, RecordResult, TargetResolver,
    TrackedEntity,
};

/// Record or builder accepted by [`Chronicler::record`].
#[derive(Debug, Clone)]
pub enum RecordInput {
    /// A builder that still has to be validated.
    Builder(RecordBuilder),
    /// An already built record.
    Record(Record),
}

impl From<RecordBuilder> for RecordInput {
    fn from(builder: RecordBuilder) -> Self {
        Self::Builder(builder)
    }
}

impl From<Record> for RecordInput {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

/// Application service writing records into one record schema.
#[derive(Clone)]
pub struct Chronicler {
    schema: Arc<RecordSchema>,
    repository: Arc<dyn RecordRepository>,
}

impl Chronicler {
    /// Creates a chronicler for the schema backed by a repository.
    #[must_use]
    pub fn new(schema: RecordSchema, repository: Arc<dyn RecordRepository>) -> Self {
        Self {
            schema: Arc::new(schema),
            repository,
        }
    }

    /// Returns the name of the record schema records are written into.
    #[must_use]
    pub fn entity_name(&self) -> &str {
        self.schema.name()
    }

    /// Returns the record schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    /// Writes an informational record.
    pub async fn log(
        &self,
        event: &str,
        message: &str,
        params: RecordParams,
    ) -> RecordResult<Record> {
        let builder = self
            .create_record(event, message, params)
            .with_type(RecordType::Log);
        self.record(builder, None).await
    }

    /// Writes an open todo record.
    pub async fn todo(
        &self,
        event: &str,
        message: &str,
        params: RecordParams,
    ) -> RecordResult<Record> {
        let builder = self
            .create_record(event, message, params)
            .with_type(RecordType::Todo);
        self.record(builder, None).await
    }

    /// Starts a builder seeded with event, message, params and the current date.
    #[must_use]
    pub fn create_record(&self, event: &str, message: &str, params: RecordParams) -> RecordBuilder {
        RecordBuilder::new(Arc::clone(&self.schema))
            .with_message(message)
            .with_event(event)
            .with_date(Utc::now())
            .with_params(params)
    }

    /// Validates and persists a record.
    ///
    /// With a `period`, fails with [`RecordError::Exists`] when an unfinished
    /// record with the same content hash was written inside the period.
    pub async fn record(
        &self,
        input: impl Into<RecordInput>,
        period: Option<&str>,
    ) -> RecordResult<Record> {
        let record = match input.into() {
            RecordInput::Builder(builder) => builder.create()?,
            RecordInput::Record(record) => record,
        };

        if let Some(period) = period {
            let query = self.dedup_query(&record, period)?;
            if let Some(existing) = self.repository.find_one(query).await? {
                info!(
                    entity = %self.schema.name(),
                    event = %record.event(),
                    hash = %existing.hash(),
                    period = %period,
                    "record already exists in period"
                );
                return Err(RecordError::Exists {
                    record: Box::new(existing),
                    period: period.to_owned(),
                });
            }
        }

        // the hash must be fixed before the record reaches storage
        let hash = record.hash().to_owned();
        if let Err(source) = self.repository.persist(record.clone()).await {
            return Err(RecordError::Failed {
                record: Box::new(record),
                source,
            });
        }

        debug!(
            entity = %self.schema.name(),
            event = %record.event(),
            hash = %hash,
            "record persisted"
        );
        Ok(record)
    }

    /// Persists records as one all-or-nothing batch.
    pub async fn record_batch(&self, records: Vec<Record>) -> RecordResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        for record in &records {
            let _ = record.hash();
        }

        let count = records.len();
        if let Err(source) = self.repository.persist_batch(records.clone()).await {
            return Err(RecordError::BatchFailed { records, source });
        }

        debug!(entity = %self.schema.name(), count, "record batch persisted");
        Ok(())
    }

    /// Returns whether a record with the same content hash exists.
    ///
    /// With a `period` only unfinished records dated inside the period match.
    pub async fn is_recorded(&self, record: &Record, period: Option<&str>) -> RecordResult<bool> {
        let query = match period {
            Some(period) => self.dedup_query(record, period)?,
            None => RecordQuery::by_hash(record.hash()),
        };

        Ok(self.repository.find_one(query).await?.is_some())
    }

    /// Resolves a record's target back into a live entity.
    pub async fn resolve_target(
        &self,
        record: &Record,
        resolver: &dyn TargetResolver,
    ) -> RecordResult<Option<Arc<dyn TrackedEntity>>> {
        match record.target() {
            Some(target) => Ok(resolver.resolve(target).await?),
            None => Ok(None),
        }
    }

    fn dedup_query(&self, record: &Record, period: &str) -> RecordResult<RecordQuery> {
        let parsed = Period::parse(period).map_err(|error| RecordError::PeriodNotValid {
            period: period.to_owned(),
            reason: match error {
                AppError::Validation(reason) => reason,
                other => other.to_string(),
            },
        })?;

        Ok(RecordQuery {
            hash: record.hash().to_owned(),
            window: Some(parsed.window(Utc::now())),
            unfinished_only: true,
        })
    }
}

#[cfg(test)]
mod tests;
