//! Storage module for persisting sweep progress and results
//!
//! This module handles the two durable artifacts of a sweep:
//! - The JSON checkpoint that makes a range resumable
//! - The CSV file of successfully extracted records

mod checkpoint;
mod records;
mod traits;

pub use checkpoint::JsonCheckpointStore;
pub use records::CsvRecordSink;
pub use traits::{CheckpointStore, RecordSink, StorageError, StorageResult};

use crate::config::OutputConfig;

/// Opens the stores named in the output configuration
///
/// Nothing is created on disk until the stores are first written.
pub fn open_stores(config: &OutputConfig) -> (JsonCheckpointStore, CsvRecordSink) {
    (
        JsonCheckpointStore::new(&config.checkpoint_path),
        CsvRecordSink::new(&config.results_path),
    )
}
