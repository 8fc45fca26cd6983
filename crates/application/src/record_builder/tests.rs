use std::sync::Arc;

use annalist_core::{ActorIdentity, AppError};
use annalist_domain::{
    FieldKind, Level, RecordField, RecordParams, RecordSchema, RecordType, TargetIdentity,
    TargetRef,
};
use chrono::{TimeZone, Utc};
use serde_json::json;

use super::RecordBuilder;
use crate::{RecordError, TrackedEntity};

fn schema() -> Arc<RecordSchema> {
    match RecordSchema::standard("activity") {
        Ok(schema) => Arc::new(schema),
        Err(error) => panic!("standard schema should build: {error}"),
    }
}

fn complete() -> RecordBuilder {
    RecordBuilder::new(schema())
        .with_event("order.cancelled")
        .with_message("Order {number} cancelled")
        .with_date(Utc::now())
}

struct Invoice;

impl TrackedEntity for Invoice {
    fn entity_type(&self) -> &str {
        "invoice"
    }

    fn identity(&self) -> Option<TargetIdentity> {
        Some(TargetIdentity::from(9))
    }

    fn record_params(&self, _action: Option<annalist_domain::Action>) -> Option<RecordParams> {
        Some(RecordParams::from([("number".to_owned(), json!("INV-9"))]))
    }

    fn record_target(&self) -> Option<TargetRef> {
        Some(TargetRef::new("customer", Some(TargetIdentity::from(3))))
    }
}

#[test]
fn create_sets_exactly_the_required_fields() {
    let Some(date) = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).single() else {
        panic!("valid timestamp");
    };
    let record = RecordBuilder::new(schema())
        .with_event("create")
        .with_message("created")
        .with_date(date)
        .create();
    let Ok(record) = record else {
        panic!("record should be valid");
    };

    assert_eq!(record.event(), "create");
    assert_eq!(record.message(), "created");
    assert_eq!(record.date(), date);
    assert_eq!(record.entity(), "activity");
    assert_eq!(record.record_type(), RecordType::Log);
    assert!(record.target().is_none());
}

#[test]
fn create_names_the_missing_required_field() {
    let cases = [
        (
            RecordBuilder::new(schema())
                .with_message("m")
                .with_date(Utc::now()),
            "event",
        ),
        (
            RecordBuilder::new(schema())
                .with_event("e")
                .with_date(Utc::now()),
            "message",
        ),
        (
            RecordBuilder::new(schema()).with_event("e").with_message("m"),
            "date",
        ),
    ];

    for (builder, missing) in cases {
        match builder.create() {
            Err(RecordError::NotValid(message)) => {
                assert!(message.contains(&format!("\"{missing}\"")), "{message}");
            }
            other => panic!("expected validity error for {missing}, got {other:?}"),
        }
    }
}

#[test]
fn create_rejects_fields_the_schema_does_not_accept() {
    let schema = RecordSchema::builder("audit")
        .and_then(|builder| builder.allow(FieldKind::Date))
        .map(|builder| Arc::new(builder.build()));
    let Ok(schema) = schema else {
        panic!("schema should build");
    };

    let result = RecordBuilder::new(schema)
        .with_event("e")
        .with_message("m")
        .with_date(Utc::now())
        .with_finished(true)
        .create();

    match result {
        Err(RecordError::NotValid(message)) => {
            assert!(message.contains("finished"));
            assert!(message.contains("audit"));
        }
        other => panic!("expected validity error, got {other:?}"),
    }
}

#[test]
fn with_params_keeps_first_written_values() {
    let builder = complete()
        .with_params(RecordParams::from([("number".to_owned(), json!("A-1"))]))
        .with_params(RecordParams::from([
            ("number".to_owned(), json!("B-2")),
            ("reason".to_owned(), json!("late")),
        ]));

    let Ok(record) = builder.create() else {
        panic!("record should be valid");
    };
    assert_eq!(record.params().get("number"), Some(&json!("A-1")));
    assert_eq!(record.params().get("reason"), Some(&json!("late")));
    assert_eq!(record.message_formatted(), "Order A-1 cancelled");
}

#[test]
fn with_param_overwrites_and_clear_params_resets() {
    let builder = complete()
        .with_params(RecordParams::from([("number".to_owned(), json!("A-1"))]))
        .with_param("number", "C-3");
    assert_eq!(
        builder.field(FieldKind::Params),
        Some(&RecordField::Params(RecordParams::from([(
            "number".to_owned(),
            json!("C-3")
        )])))
    );

    let cleared = builder.clear_params();
    assert!(cleared.field(FieldKind::Params).is_none());
}

#[test]
fn record_directives_set_fields_instead_of_params() {
    let builder = complete().with_params(RecordParams::from([
        ("record.level".to_owned(), json!("danger")),
        ("Record.Note".to_owned(), json!("escalated")),
        ("record.unknown".to_owned(), json!(1)),
        ("number".to_owned(), json!("A-1")),
    ]));

    let Ok(record) = builder.create() else {
        panic!("record should be valid");
    };
    assert_eq!(record.level(), Level::Danger);
    assert_eq!(record.note(), Some("escalated"));
    assert!(!record.params().contains_key("record.level"));
    assert!(!record.params().contains_key("Record.Note"));
    assert_eq!(record.params().get("record.unknown"), Some(&json!(1)));
}

#[test]
fn invalid_directive_value_fails_on_create() {
    let builder = complete().with_params(RecordParams::from([(
        "record.level".to_owned(),
        json!("purple"),
    )]));

    assert!(matches!(builder.create(), Err(RecordError::NotValid(_))));
}

#[test]
fn with_target_merges_params_and_follows_redirect() {
    let Ok(record) = complete().with_target(&Invoice).create() else {
        panic!("record should be valid");
    };

    assert_eq!(record.params().get("number"), Some(&json!("INV-9")));
    assert_eq!(record.target().map(TargetRef::entity_type), Some("customer"));
}

#[test]
fn with_error_summarises_error_and_leaves_finished_open() {
    let error = AppError::Internal("disk full".to_owned());
    let Ok(record) = complete().with_error(Some(&error), None).create() else {
        panic!("record should be valid");
    };

    assert_eq!(record.note(), Some("AppError: internal error: disk full"));
    assert!(!record.is_finished());
}

#[test]
fn boxed_errors_are_named_by_the_caller() {
    let boxed: Box<dyn std::error::Error + Send + Sync> =
        Box::new(AppError::Internal("disk full".to_owned()));
    let Ok(record) = complete()
        .with_error_kind("AppError", Some(boxed.as_ref()), Some(true))
        .create()
    else {
        panic!("record should be valid");
    };

    assert_eq!(record.note(), Some("AppError: internal error: disk full"));
    assert!(record.is_finished());
}

#[test]
fn with_error_names_the_concrete_error_type() {
    let error = std::io::Error::other("socket closed");
    let Ok(record) = complete().with_error(Some(&error), None).create() else {
        panic!("record should be valid");
    };

    assert_eq!(record.note(), Some("Error: socket closed"));
}

#[test]
fn with_error_without_error_finishes_unless_already_set() {
    let Ok(finished) = complete().with_error(None::<&AppError>, None).create() else {
        panic!("record should be valid");
    };
    assert!(finished.is_finished());

    let Ok(kept) = complete()
        .with_finished(false)
        .with_error(None::<&AppError>, None)
        .create()
    else {
        panic!("record should be valid");
    };
    assert!(!kept.is_finished());
}

#[test]
fn with_author_sets_owner() {
    let Ok(record) = complete()
        .with_author(ActorIdentity::new("alice"))
        .create()
    else {
        panic!("record should be valid");
    };

    assert_eq!(record.owner().map(ActorIdentity::subject), Some("alice"));
}
