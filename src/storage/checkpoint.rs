//! JSON checkpoint file
//!
//! Every save writes a complete record to a temporary file in the target
//! directory and renames it over the checkpoint, so a crash mid-write leaves
//! the previous checkpoint in place.

use crate::state::{now_unix_seconds, ScrapeState};
use crate::storage::traits::{CheckpointStore, StorageError, StorageResult};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;

/// Checkpoint stored as a single JSON object on disk
#[derive(Debug)]
pub struct JsonCheckpointStore {
    path: PathBuf,
    /// Processed count of the last record written, used to drop stale saves
    last_saved: Mutex<Option<u64>>,
}

impl JsonCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_saved: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    fn write_atomically(&self, contents: &[u8]) -> StorageResult<()> {
        let mut tmp = NamedTempFile::new_in(self.directory())?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StorageError::Persist {
            path: self.path.display().to_string(),
            message: e.error.to_string(),
        })?;
        Ok(())
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn load(&self) -> Option<ScrapeState> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No checkpoint at {}", self.path.display());
                return None;
            }
            Err(e) => {
                tracing::warn!("Failed to read checkpoint {}: {}", self.path.display(), e);
                return None;
            }
        };

        let mut state: ScrapeState = match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable checkpoint {}: {}",
                    self.path.display(),
                    e
                );
                return None;
            }
        };

        if !state.is_consistent() {
            tracing::warn!(
                "Checkpoint counts disagree (processed {}), rebuilding from categories",
                state.processed_count
            );
            state.repair_counts();
        }

        let now = now_unix_seconds();
        if !state.has_plausible_start(now) {
            tracing::warn!(
                "Checkpoint start time {} is out of range, restarting the clock",
                state.start_time
            );
            state.start_time = now;
        }

        Some(state)
    }

    fn save(&self, state: &ScrapeState) -> StorageResult<()> {
        let mut last_saved = self.last_saved.lock().unwrap_or_else(PoisonError::into_inner);

        // A slower worker may arrive with an older snapshot
        if matches!(*last_saved, Some(count) if state.processed_count < count) {
            return Ok(());
        }

        let encoded = serde_json::to_vec(state)?;
        self.write_atomically(&encoded)?;
        *last_saved = Some(state.processed_count);
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        let mut last_saved = self.last_saved.lock().unwrap_or_else(PoisonError::into_inner);
        *last_saved = None;

        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
