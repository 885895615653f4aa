//! Core error types for kiwi-core.
//!
//! This module defines the error hierarchy using thiserror. The three
//! failure classes callers care about are:
//!
//! - [`InvalidRuleError`]: a recurrence rule is malformed. Raised when a
//!   template is created and again when it is materialized; never partially
//!   applied.
//! - [`CoreError::ConcurrentModification`]: a compare-and-set write lost to
//!   another writer. The caller retries the whole operation.
//! - [`DatabaseError`]: the store itself failed. Propagated unchanged.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for kiwi-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed recurrence configuration
    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(#[from] InvalidRuleError),

    /// Stored state changed between read and write
    #[error("Concurrent modification of {entity} '{id}'; retry the operation")]
    ConcurrentModification { entity: String, id: String },

    /// Persistence errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Entity lookup failed
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn conflict(entity: &str, id: impl Into<String>) -> Self {
        CoreError::ConcurrentModification {
            entity: entity.to_string(),
            id: id.into(),
        }
    }

    pub(crate) fn not_found(entity: &str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.to_string(),
            id: id.into(),
        }
    }

    /// Whether retrying the whole operation from persisted state may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::ConcurrentModification { .. } | CoreError::Database(DatabaseError::Locked)
        )
    }
}

/// Recurrence rule errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidRuleError {
    /// Interval must be at least 1
    #[error("interval must be >= 1, got {0}")]
    NonPositiveInterval(i64),

    /// Frequency string is not one of daily/weekly/monthly
    #[error("unknown frequency '{0}' (expected daily, weekly or monthly)")]
    UnknownFrequency(String),

    /// End date precedes the anchor
    #[error("end date {end} is before anchor date {anchor}")]
    EndBeforeAnchor {
        anchor: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    /// A date field could not be parsed
    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),

    /// Task carries no recurrence rule
    #[error("task '{0}' is not a recurring template")]
    NotATemplate(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A stored value could not be decoded
    #[error("Corrupt row in {table}: {message}")]
    Corrupt { table: String, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Templates are never completed directly
    #[error("Task '{0}' is a recurring template and cannot be completed; complete one of its occurrences")]
    TemplateCompletion(String),
}

impl ValidationError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg)
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy =>
            {
                DatabaseError::Locked
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
