use crate::extract::{ExtractedRecord, FieldName};
use crate::storage::traits::{RecordSink, StorageResult};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// CSV results file
///
/// One header row with the field names, then one row per successful record
/// in [`FieldName::ALL`] order. A single writer sits behind a lock and is
/// flushed after every row, so rows never interleave and an interrupted run
/// keeps everything written so far.
#[derive(Debug)]
pub struct CsvRecordSink {
    path: PathBuf,
    writer: Mutex<Option<csv::Writer<File>>>,
}

impl CsvRecordSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Option<csv::Writer<File>>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordSink for CsvRecordSink {
    fn initialize(&self) -> StorageResult<()> {
        let mut guard = self.lock();
        // Close any open handle before truncating
        *guard = None;

        let mut writer = csv::Writer::from_writer(File::create(&self.path)?);
        writer.write_record(FieldName::ALL.iter().map(FieldName::as_str))?;
        writer.flush()?;
        *guard = Some(writer);

        tracing::debug!("Initialized results file {}", self.path.display());
        Ok(())
    }

    fn ensure_initialized(&self) -> StorageResult<()> {
        let has_content = std::fs::metadata(&self.path)
            .map(|meta| meta.len() > 0)
            .unwrap_or(false);

        if has_content {
            Ok(())
        } else {
            self.initialize()
        }
    }

    fn append(&self, record: &ExtractedRecord) -> StorageResult<()> {
        let mut guard = self.lock();

        if guard.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            *guard = Some(csv::Writer::from_writer(file));
        }

        if let Some(writer) = guard.as_mut() {
            writer.write_record(record.to_row())?;
            writer.flush()?;
        }
        Ok(())
    }
}
