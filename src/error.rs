use std::path::PathBuf;
use thiserror::Error;

/// Custom Result type for this crate.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Enum representing all possible errors in the quiz_etl pipeline.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Invalid JSON in {path} at line {line}: {source}")]
    MalformedInput {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("No valid records in {0}")]
    EmptyInput(PathBuf),

    #[error("Missing column in record table: {0}")]
    Schema(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Failures while opening or writing the quiz database.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error("cannot create database directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<rusqlite::Error> for EtlError {
    fn from(e: rusqlite::Error) -> Self {
        EtlError::Storage(StorageError::Database(e))
    }
}
