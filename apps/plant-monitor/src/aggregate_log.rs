use crate::channels::{ChannelSet, SENTINEL};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum AggregateLogError {
    #[error("aggregate log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("aggregate log {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Append-only CSV file holding one row per completed hour or day.
///
/// The first column is the period label, followed by one integer per channel in channel order.
/// The header is written exactly once, when the file is first created.
#[derive(Debug, Clone)]
pub struct AggregateLog {
    path: PathBuf,
    header: Vec<String>,
}

impl AggregateLog {
    pub fn new(path: impl Into<PathBuf>, label_column: &str, channels: &ChannelSet) -> Self {
        let header = std::iter::once(label_column)
            .chain(channels.columns())
            .map(str::to_string)
            .collect();
        Self {
            path: path.into(),
            header,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn append(&self, label: &str, values: &[i64]) -> Result<(), AggregateLogError> {
        self.ensure_parent()?;
        let exists = self.path.exists();
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_err(source))?;
        let mut writer = csv::Writer::from_writer(file);
        if !exists {
            writer
                .write_record(&self.header)
                .map_err(|source| self.csv_err(source))?;
        }
        let record = std::iter::once(label.to_string()).chain(values.iter().map(i64::to_string));
        writer
            .write_record(record)
            .map_err(|source| self.csv_err(source))?;
        writer.flush().map_err(|source| self.io_err(source))?;
        Ok(())
    }

    /// Truncates the log back to its header row.
    pub fn clear(&self) -> Result<(), AggregateLogError> {
        self.ensure_parent()?;
        let file = fs::File::create(&self.path).map_err(|source| self.io_err(source))?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(&self.header)
            .map_err(|source| self.csv_err(source))?;
        writer.flush().map_err(|source| self.io_err(source))?;
        tracing::info!(path = %self.path.display(), "aggregate log cleared");
        Ok(())
    }

    /// Data rows keyed by label. A missing file is an empty log; a later row with the same label
    /// replaces an earlier one.
    pub fn read_indexed(&self) -> Result<HashMap<String, Vec<i64>>, AggregateLogError> {
        Ok(self.read_rows()?.into_iter().collect())
    }

    /// The last `n` data rows in file order.
    pub fn read_last_n(&self, n: usize) -> Result<Vec<(String, Vec<i64>)>, AggregateLogError> {
        let mut rows = self.read_rows()?;
        let skip = rows.len().saturating_sub(n);
        Ok(rows.split_off(skip))
    }

    /// The file exactly as stored.
    pub fn read_raw(&self) -> Result<Vec<u8>, AggregateLogError> {
        fs::read(&self.path).map_err(|source| self.io_err(source))
    }

    /// Header plus the last `n` data rows, re-encoded as CSV.
    pub fn export_last_n(&self, n: usize) -> Result<Vec<u8>, AggregateLogError> {
        let rows = self.read_last_n(n)?;
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.header)
            .map_err(|source| self.csv_err(source))?;
        for (label, values) in rows {
            let record = std::iter::once(label).chain(values.iter().map(i64::to_string));
            writer
                .write_record(record)
                .map_err(|source| self.csv_err(source))?;
        }
        writer
            .into_inner()
            .map_err(|err| self.io_err(err.into_error()))
    }

    fn read_rows(&self) -> Result<Vec<(String, Vec<i64>)>, AggregateLogError> {
        let channels = self.header.len().saturating_sub(1);
        let mut reader = match csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)
        {
            Ok(reader) => reader,
            Err(err) => {
                if let csv::ErrorKind::Io(io_err) = err.kind() {
                    if io_err.kind() == io::ErrorKind::NotFound {
                        return Ok(Vec::new());
                    }
                }
                return Err(self.csv_err(err));
            }
        };

        // Byte records, so a damaged row only loses its own undecodable cells.
        let mut rows = Vec::new();
        for record in reader.byte_records() {
            let record = record.map_err(|source| self.csv_err(source))?;
            let Some(label) = record.get(0) else {
                continue;
            };
            let values = (0..channels)
                .map(|idx| parse_cell(record.get(idx + 1)))
                .collect();
            rows.push((String::from_utf8_lossy(label).into_owned(), values));
        }
        Ok(rows)
    }

    fn ensure_parent(&self) -> Result<(), AggregateLogError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).map_err(|source| self.io_err(source))
            }
            _ => Ok(()),
        }
    }

    fn io_err(&self, source: io::Error) -> AggregateLogError {
        AggregateLogError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_err(&self, source: csv::Error) -> AggregateLogError {
        AggregateLogError::Csv {
            path: self.path.clone(),
            source,
        }
    }
}

fn parse_cell(cell: Option<&[u8]>) -> i64 {
    cell.and_then(|raw| std::str::from_utf8(raw).ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(SENTINEL)
}
