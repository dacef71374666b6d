use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::terminal_state::ChangeRecord;
use crate::domain::time_format::format_moscow_time;

const HEADER: [&str; 5] = [
    "Terminal ID",
    "Timestamp",
    "Status Code",
    "Status Name",
    "Offline Duration",
];

#[derive(Debug, Error)]
pub enum CsvLogError {
    #[error("failed to open change log file: {0}")]
    Open(#[source] std::io::Error),
    #[error("failed to append change log record: {0}")]
    Write(#[from] csv::Error),
    #[error("failed to flush change log file: {0}")]
    Flush(#[source] std::io::Error),
}

/// Append-only CSV change log. The header row is written only when the file
/// is first created; existing rows are never rewritten or reordered.
#[derive(Debug, Clone)]
pub struct CsvChangeLog {
    path: PathBuf,
}

impl CsvChangeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &ChangeRecord) -> Result<(), CsvLogError> {
        let write_header = !self.path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(CsvLogError::Open)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if write_header {
            writer.write_record(HEADER)?;
        }

        writer.write_record(&[
            record.terminal_id.to_string(),
            format_moscow_time(record.timestamp),
            record.status.code().to_string(),
            record.status.name().to_string(),
            record.offline_duration.clone().unwrap_or_default(),
        ])?;

        writer.flush().map_err(CsvLogError::Flush)
    }
}
