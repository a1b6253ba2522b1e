//! Record layer error types.

use crate::storage::error::StorageError;
use thiserror::Error;

/// Errors that can occur in the record layer.
#[derive(Error, Debug)]
pub enum RecordError {
    /// A stale or wrong Rid, not a bug: the slot holds no record.
    #[error("no record at page {page_no}, slot {slot_no}")]
    RecordNotFound { page_no: i32, slot_no: i32 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for record operations.
pub type RecordResult<T> = Result<T, RecordError>;
