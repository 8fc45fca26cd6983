use std::env;

use annalist_core::{ActorIdentity, AppError, AppResult};
use annalist_domain::{Period, RecordParams, RecordType};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Command line of the `annalist-recorder` binary.
#[derive(Debug, Parser)]
#[command(name = "annalist-recorder", version, about = "Writes one audit record")]
pub struct RecorderCli {
    #[command(subcommand)]
    pub command: RecorderCommand,
}

/// What the recorder was asked to do.
#[derive(Debug, Clone, Subcommand)]
pub enum RecorderCommand {
    /// Run the record migrations and exit.
    Migrate,
    /// Write a log record.
    Log(WriteArgs),
    /// Write a todo record.
    Todo(WriteArgs),
}

/// Arguments of a record write.
#[derive(Debug, Clone, Args)]
pub struct WriteArgs {
    /// Event key, e.g. `invoice.overdue`.
    pub event: String,
    /// Message template with `{name}` placeholders.
    pub message: String,
    /// Parameters as `name=value`; values that parse as JSON keep their type.
    #[arg(value_parser = parse_param)]
    pub params: Vec<(String, Value)>,
}

impl RecorderCommand {
    /// Splits a write command into its record type and arguments.
    pub fn into_write(self) -> Option<(RecordType, WriteArgs)> {
        match self {
            Self::Migrate => None,
            Self::Log(args) => Some((RecordType::Log, args)),
            Self::Todo(args) => Some((RecordType::Todo, args)),
        }
    }
}

impl WriteArgs {
    pub fn record_params(&self) -> RecordParams {
        self.params.iter().cloned().collect()
    }
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub command: RecorderCommand,
    pub database_url: String,
    pub entity_name: String,
    pub dedup_period: Option<String>,
    pub owner: Option<ActorIdentity>,
}

impl RecorderConfig {
    pub fn load(command: RecorderCommand) -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let entity_name =
            optional_env("ANNALIST_ENTITY_NAME").unwrap_or_else(|| "activity".to_owned());
        let dedup_period = optional_env("ANNALIST_DEDUP_PERIOD");
        if let Some(period) = &dedup_period
            && let Err(error) = Period::parse(period)
        {
            return Err(AppError::Validation(format!(
                "invalid ANNALIST_DEDUP_PERIOD value '{period}': {error}"
            )));
        }
        let owner = optional_env("ANNALIST_OWNER_SUBJECT").map(ActorIdentity::new);

        Ok(Self {
            command,
            database_url,
            entity_name,
            dedup_period,
            owner,
        })
    }
}

fn parse_param(pair: &str) -> Result<(String, Value), String> {
    let Some((name, value)) = pair.split_once('=') else {
        return Err(format!("parameter '{pair}' must have the form name=value"));
    };
    if name.is_empty() {
        return Err(format!("parameter '{pair}' has no name"));
    }

    let value =
        serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((name.to_owned(), value))
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
