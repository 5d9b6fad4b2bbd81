//! Error types for archive and restore operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed batch: {0}")]
    MalformedBatch(String),

    #[error("unsupported column type {ty} for column {column}")]
    UnsupportedColumn { column: String, ty: String },

    #[error(
        "archive header does not match table {table}: archive columns [{archive_columns}], table columns [{table_columns}]"
    )]
    SchemaMismatch {
        table: String,
        archive_columns: String,
        table_columns: String,
    },

    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("table {0} has no columns (does it exist?)")]
    UnknownTable(String),

    #[error("invalid date or month: {0}")]
    BadDate(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<String> for ArchiveError {
    fn from(s: String) -> Self {
        ArchiveError::Configuration(s)
    }
}
