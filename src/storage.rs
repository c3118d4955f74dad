//! Append-only CSV sample log.
//!
//! One log file per run. Creation is exclusive so an existing file is never
//! clobbered; every appended row is flushed before the engine moves on, so
//! a crash at any point loses at most the row being written.

use crate::core::SampleRecord;
use crate::error::{DaqError, Result};
use csv::Writer;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Decimal places written for every numeric field.
const FIELD_PRECISION: usize = 4;

#[derive(Debug)]
pub struct SampleLog {
    path: PathBuf,
    writer: Writer<File>,
}

impl SampleLog {
    /// Creates the log file and writes the header row.
    ///
    /// Fails with [`DaqError::LogExists`] if `path` already exists; the
    /// caller picks a fresh filename, never overwrites.
    pub fn create(path: impl AsRef<Path>, columns: &[String]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => DaqError::LogExists(path.clone()),
                _ => DaqError::Io(e),
            })?;
        let mut writer = Writer::from_writer(file);

        let mut header = Vec::with_capacity(columns.len() + 2);
        header.push("sample".to_string());
        header.push("time".to_string());
        header.extend(columns.iter().cloned());
        writer.write_record(&header)?;
        writer.flush()?;

        Ok(Self { path, writer })
    }

    /// Appends one record and flushes it to disk before returning.
    pub fn append(&mut self, record: &SampleRecord) -> Result<()> {
        let mut row = Vec::with_capacity(record.fields.len() + 2);
        row.push(record.index.to_string());
        row.push(record.timestamp.to_rfc3339());
        for field in &record.fields {
            row.push(match field {
                Some(value) => format!("{:.*}", FIELD_PRECISION, value),
                None => String::new(),
            });
        }
        self.writer.write_record(&row)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn columns() -> Vec<String> {
        vec![
            "temp_1".to_string(),
            "rate_1".to_string(),
            "pressure".to_string(),
        ]
    }

    fn record(index: u64, fields: Vec<Option<f64>>) -> SampleRecord {
        SampleRecord {
            index,
            timestamp: Utc::now(),
            fields,
        }
    }

    #[test]
    fn test_header_row_written_on_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        let _log = SampleLog::create(&path, &columns()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents.lines().next().unwrap(),
            "sample,time,temp_1,rate_1,pressure"
        );
    }

    #[test]
    fn test_existing_file_is_never_clobbered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        std::fs::write(&path, "precious data\n").unwrap();

        let err = SampleLog::create(&path, &columns()).unwrap_err();
        assert!(matches!(err, DaqError::LogExists(p) if p == path));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "precious data\n");
    }

    #[test]
    fn test_every_append_is_durable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        let mut log = SampleLog::create(&path, &columns()).unwrap();

        for i in 0..3 {
            log.append(&record(i, vec![Some(23.5), Some(0.12), Some(1010.0)]))
                .unwrap();
            // Visible on disk immediately, without dropping the writer.
            let contents = std::fs::read_to_string(&path).unwrap();
            assert_eq!(contents.lines().count() as u64, i + 2);
        }
    }

    #[test]
    fn test_missing_fields_keep_column_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        let mut log = SampleLog::create(&path, &columns()).unwrap();
        log.append(&record(0, vec![Some(23.5), None, Some(1010.0)]))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let row = contents.lines().nth(1).unwrap();
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[0], "0");
        assert_eq!(fields[2], "23.5000");
        assert_eq!(fields[3], "");
        assert_eq!(fields[4], "1010.0000");
    }
}
