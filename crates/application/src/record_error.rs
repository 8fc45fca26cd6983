use annalist_core::AppError;
use annalist_domain::Record;
use thiserror::Error;

/// Result type of record assembly and the write path.
pub type RecordResult<T> = Result<T, RecordError>;

/// Failures raised while building or writing records.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The record is missing a required field or carries a field its schema
    /// does not accept.
    #[error("record not valid: {0}")]
    NotValid(String),

    /// The deduplication period is unparsable or does not point into the past.
    #[error("period '{period}' not valid: {reason}")]
    PeriodNotValid {
        /// Period as given by the caller.
        period: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An unfinished record with the same content already exists.
    #[error("record already exists in period of {period}: {record}")]
    Exists {
        /// The record found in storage.
        record: Box<Record>,
        /// Period that was searched.
        period: String,
    },

    /// Storage rejected the record.
    #[error("record failed: {record}")]
    Failed {
        /// Record that could not be written.
        record: Box<Record>,
        /// Underlying storage error.
        #[source]
        source: AppError,
    },

    /// Storage rejected a batch of records; none of them were written.
    #[error("record batch of {} failed", .records.len())]
    BatchFailed {
        /// Records that could not be written.
        records: Vec<Record>,
        /// Underlying storage error.
        #[source]
        source: AppError,
    },

    /// A port failed outside of a write.
    #[error(transparent)]
    App(#[from] AppError),
}

impl RecordError {
    /// Returns the record carried by the error, if any.
    #[must_use]
    pub fn record(&self) -> Option<&Record> {
        match self {
            Self::Exists { record, .. } | Self::Failed { record, .. } => Some(record),
            _ => None,
        }
    }
}

impl From<RecordError> for AppError {
    fn from(error: RecordError) -> Self {
        match error {
            RecordError::App(inner) => inner,
            RecordError::NotValid(_) | RecordError::PeriodNotValid { .. } => {
                AppError::Validation(error.to_string())
            }
            RecordError::Exists { .. } => AppError::Conflict(error.to_string()),
            RecordError::Failed { .. } | RecordError::BatchFailed { .. } => {
                AppError::Internal(error.to_string())
            }
        }
    }
}
