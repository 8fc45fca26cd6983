//! Annalist recorder: writes one audit record into PostgreSQL.

#![forbid(unsafe_code)]

mod recorder_config;

use std::sync::Arc;

use annalist_application::{Chronicler, RecordError};
use annalist_core::{AppError, AppResult};
use annalist_domain::RecordSchema;
use annalist_infrastructure::PostgresRecordRepository;
use clap::Parser;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::recorder_config::{RecorderCli, RecorderConfig, init_tracing};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = RecorderCli::parse();
    let config = RecorderConfig::load(cli.command)?;
    let pool = connect_and_migrate(config.database_url.as_str()).await?;

    let Some((record_type, args)) = config.command.into_write() else {
        info!("migrations completed; exiting because migrate command was provided");
        return Ok(());
    };

    let schema = RecordSchema::standard(config.entity_name.as_str())?;
    let repository = Arc::new(PostgresRecordRepository::new(pool, config.entity_name.as_str()));
    let chronicler = Chronicler::new(schema, repository);

    let builder = chronicler
        .create_record(args.event.as_str(), args.message.as_str(), args.record_params())
        .with_type(record_type)
        .with_owner(config.owner);

    match chronicler
        .record(builder, config.dedup_period.as_deref())
        .await
    {
        Ok(record) => {
            info!(
                entity = %record.entity(),
                record_type = %record.record_type().as_str(),
                hash = %record.hash(),
                "{}",
                record.message_formatted()
            );
            Ok(())
        }
        Err(RecordError::Exists { record, period }) => {
            info!(
                hash = %record.hash(),
                period = %period,
                "record skipped, already recorded"
            );
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

async fn connect_and_migrate(database_url: &str) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    Ok(pool)
}
