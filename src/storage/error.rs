//! Storage layer error types.

use crate::storage::page::FileId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("file already exists: {0:?}")]
    FileExists(PathBuf),

    #[error("file not found: {0:?}")]
    FileNotFound(PathBuf),

    #[error("file is still open: {0:?}")]
    FileNotClosed(PathBuf),

    #[error("{0} is not an open file")]
    FileNotOpen(FileId),

    #[error("page {page_no} does not exist in {file:?}")]
    PageNotExist { file: PathBuf, page_no: i32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
