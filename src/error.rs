//! Error types for the weighbridge backend.
//!
//! Frame-level parse misses are not errors (the parser returns `None`), so
//! nothing here describes them.

use thiserror::Error;

use crate::scale::ConnectionState;

/// Faults raised by the scale link lifecycle.
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("serial I/O is not supported on this host")]
    Unsupported,

    #[error("scale link is already {0}; disconnect first")]
    AlreadyActive(ConnectionState),

    #[error("failed to open scale port: {0}")]
    Open(String),

    #[error("scale I/O fault: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection attempt was cancelled by disconnect")]
    Cancelled,
}

/// Store-level failures (SQLite or in-memory ledger).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid record: {0}")]
    Invalid(String),

    #[error("a partial transaction already exists for vehicle {0}")]
    DuplicatePartial(String),
}

/// Rejections surfaced synchronously by `Reconciler::submit`.
///
/// None of these leave a mutation behind in the ledger.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingRequiredFields(Vec<String>),

    #[error("second weighing not allowed for unseen vehicle {0}")]
    SecondWeighingNotAllowed(String),

    #[error("invalid weight for {field}: {value}")]
    InvalidWeight { field: String, value: f64 },

    #[error("{field} is not a number: {raw:?}")]
    InvalidNumber { field: String, raw: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report range ends ({end}) before it starts ({start})")]
    InvalidRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("csv export: {0}")]
    Csv(#[from] csv::Error),

    #[error("report output: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not resolve a data directory")]
    NoDataDir,

    #[error("unknown setting {0}")]
    UnknownKey(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
