//! Storage traits and error types
//!
//! This module defines the two durable stores the dispatcher writes to: the
//! progress checkpoint and the append-only results sink.

use crate::extract::ExtractedRecord;
use crate::state::ScrapeState;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to persist {path}: {message}")]
    Persist { path: String, message: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable record of sweep progress
///
/// Implementations must be thread-safe: workers save concurrently.
pub trait CheckpointStore: Send + Sync {
    /// Loads the saved state
    ///
    /// Fails soft: a missing or unreadable record is reported as `None`.
    fn load(&self) -> Option<ScrapeState>;

    /// Replaces the saved state
    ///
    /// Each call is atomic with respect to concurrent `load` calls: a reader
    /// sees either the previous record or the new one, never a partial write.
    fn save(&self, state: &ScrapeState) -> StorageResult<()>;

    /// Removes the saved state; succeeds when nothing is saved
    fn clear(&self) -> StorageResult<()>;
}

/// Append-only store of successfully extracted records
///
/// Concurrent appends must never interleave within a row. Ordering between
/// rows from different workers is unspecified.
pub trait RecordSink: Send + Sync {
    /// (Re)creates the backing store containing only the header row
    ///
    /// Must not be called while workers are appending.
    fn initialize(&self) -> StorageResult<()>;

    /// Creates the backing store with its header row if it does not exist yet
    fn ensure_initialized(&self) -> StorageResult<()>;

    /// Appends one complete record
    fn append(&self, record: &ExtractedRecord) -> StorageResult<()>;
}
