//! Catalog error types.

use crate::record::error::RecordError;
use crate::storage::error::StorageError;
use thiserror::Error;

/// Errors surfaced by the catalog. Schema errors carry the offending name;
/// lower layers pass through unchanged.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("database already exists: {0}")]
    DatabaseExists(String),

    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("index already exists on {table} ({columns})")]
    IndexExists { table: String, columns: String },

    #[error("index not found on {table} ({columns})")]
    IndexNotFound { table: String, columns: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index error: {0}")]
    Index(anyhow::Error),
}

impl From<anyhow::Error> for CatalogError {
    fn from(e: anyhow::Error) -> Self {
        CatalogError::Index(e)
    }
}

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;
