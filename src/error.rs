use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::integrity::CheckResult;

/// Run-fatal errors. Anything returned as a `PipelineError` aborts the stage it
/// was raised in.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input file not found: {}", path.display())]
    InputMissing { path: PathBuf },

    #[error("Invalid header in {}: {message}", path.display())]
    InvalidHeader { path: PathBuf, message: String },

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not connect to document store at {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    #[error("Document store error: {message}")]
    Store { message: String },

    #[error("Batch of {count} documents exceeds the bulk insert limit of {limit}")]
    BatchTooLarge { count: usize, limit: usize },

    #[error("Integrity check failed: {0}")]
    IntegrityViolation(Box<CheckResult>),
}

impl From<rusqlite::Error> for PipelineError {
    fn from(err: rusqlite::Error) -> Self {
        PipelineError::Store {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Per-record failures. A `RecordError` drops the offending record and the
/// run carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("missing value for '{field}'")]
    MissingValue { field: &'static str },

    #[error("row is not valid UTF-8")]
    InvalidUtf8,

    #[error("'Name' is empty after removing honorifics")]
    EmptyName,

    #[error("invalid '{field}' value '{value}': {reason}")]
    InvalidDecimal {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid '{field}' value '{value}': expected a non-negative integer")]
    InvalidInteger { field: &'static str, value: String },

    #[error("invalid '{field}' value '{value}': expected a YYYY-MM-DD date")]
    InvalidDate { field: &'static str, value: String },
}
