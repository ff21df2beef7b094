//! Error taxonomy for the importer.
//!
//! Fatal errors (`SourceError`, `StoreError::Connection`, `ConfigError`) stop
//! the pipeline. Row-level errors (`CoerceError`, `StoreError::Row`) are counted
//! by the fact loader and never leave its row loop.

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::Stage;

/// Failure to read or interpret the source file.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read source file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed source file")]
    Csv(#[from] csv::Error),

    #[error("source file is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

/// Failure reported by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage connection is gone; nothing after this can succeed.
    #[error("storage connection lost: {0}")]
    Connection(sqlx::Error),

    /// A single statement was rejected (constraint violation, bad value, ...).
    #[error("storage rejected row: {0}")]
    Row(String),
}

impl StoreError {
    /// Sort a driver error into connection loss vs. a rejected statement.
    pub fn classify(err: sqlx::Error) -> Self {
        if is_connection_error(&err) {
            StoreError::Connection(err)
        } else {
            StoreError::Row(err.to_string())
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

fn is_connection_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        // SQLSTATE 08xxx: connection exception, 57xxx: operator intervention
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| code.starts_with("08") || code.starts_with("57"))
            .unwrap_or(false),
        _ => false,
    }
}

/// A source field that could not be converted to its column type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoerceError {
    #[error("invalid {field} '{value}': expected an integer")]
    Integer { field: &'static str, value: String },

    #[error("invalid {field} '{value}': expected a decimal")]
    Decimal { field: &'static str, value: String },

    #[error("invalid InvoiceDate '{0}': unrecognised date/time format")]
    Date(String),
}

/// Invalid runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("delimiter must be a single ASCII character, got '{0}'")]
    InvalidDelimiter(char),

    #[error("DB_PASSWORD is set but DB_USER is missing")]
    PasswordWithoutUser,

    #[error("batch size must be greater than zero")]
    ZeroBatchSize,

    #[error("invalid DB_URL")]
    DbUrl(#[source] sqlx::Error),
}

/// Any error that aborts an import run.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A fatal error tagged with the pipeline stage it happened in.
#[derive(Debug, Error)]
#[error("import failed during stage {stage}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: ImportError,
}
