//! Binary and event-log appending
//!
//! Sample chunks go to the data file as little-endian f32 columns; markers go
//! to a tab-separated side log that is folded into the dataset at finalize.

use super::extractor::Chunk;
use crate::utils::error::{RecorderError, RecorderResult};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// First line of every event log
pub const EVENT_LOG_HEADER: &str = "type\tlatency";

/// Bytes per stored sample value
pub const BYTES_PER_VALUE: u64 = 4;

/// Encode column-major samples as little-endian f32 bytes
pub fn encode_samples(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_VALUE as usize);
    for value in samples {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Format one event-log line (without the newline)
///
/// Tabs and line breaks in the marker type would split the line, so they are
/// replaced by spaces.
pub fn format_event_line(kind: &str, latency: f64) -> String {
    let kind: String = kind
        .chars()
        .map(|c| if matches!(c, '\t' | '\r' | '\n') { ' ' } else { c })
        .collect();
    format!("{}\t{}", kind, latency)
}

/// Appends chunks to the data file and markers to the event log
#[derive(Debug)]
pub struct BinaryAppender {
    nbchan: usize,
    data_path: PathBuf,
    data: File,
    log_path: PathBuf,
    log: File,
    samples_written: u64,
}

impl BinaryAppender {
    /// Create both files, truncating any leftovers, and write the log header
    pub fn create(data_path: &Path, log_path: &Path, nbchan: usize) -> RecorderResult<Self> {
        let data = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(data_path)?;

        let mut log = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(log_path)?;
        writeln!(log, "{}", EVENT_LOG_HEADER)?;

        tracing::debug!("Opened data file {:?} and event log {:?}", data_path, log_path);

        Ok(Self {
            nbchan,
            data_path: data_path.to_path_buf(),
            data,
            log_path: log_path.to_path_buf(),
            log,
            samples_written: 0,
        })
    }

    pub fn nbchan(&self) -> usize {
        self.nbchan
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Columns appended so far
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Column count derived from the data file size
    pub fn samples_on_disk(&self) -> RecorderResult<u64> {
        let size = self.data.metadata()?.len();
        let column_bytes = BYTES_PER_VALUE * self.nbchan.max(1) as u64;
        Ok(size / column_bytes)
    }

    /// Append one chunk, returning the number of columns written
    ///
    /// Event latencies are file positions: the chunk's first column lands at
    /// 1-based sample `samples_written + 1`. A failed data write is rolled
    /// back to the last full column so the file stays appendable.
    pub fn append(&mut self, chunk: &Chunk) -> RecorderResult<usize> {
        if chunk.is_empty() {
            return Ok(0);
        }
        if chunk.nbchan != self.nbchan {
            return Err(RecorderError::Configuration(format!(
                "Chunk has {} channels, data file expects {}",
                chunk.nbchan, self.nbchan
            )));
        }

        let columns = chunk.len();
        let bytes = encode_samples(&chunk.samples[..columns * self.nbchan]);
        let committed = self.samples_written * BYTES_PER_VALUE * self.nbchan as u64;

        if let Err(e) = self.data.write_all(&bytes) {
            tracing::error!("Data write failed, truncating to {} bytes: {}", committed, e);
            if let Err(truncate_err) = self.data.set_len(committed) {
                tracing::error!("Could not roll back data file: {}", truncate_err);
            }
            return Err(e.into());
        }

        let chunk_start = self.samples_written + 1;
        if !chunk.markers.is_empty() {
            let mut lines = String::new();
            for marker in &chunk.markers {
                let latency = (chunk_start + marker.column as u64) as f64 + marker.record.latency;
                lines.push_str(&format_event_line(&marker.record.kind, latency));
                lines.push('\n');
            }
            self.log.write_all(lines.as_bytes())?;
        }

        self.samples_written += columns as u64;
        Ok(columns)
    }

    /// Flush both files to disk and hand them back
    pub fn finish(mut self) -> RecorderResult<(File, File)> {
        self.data.flush()?;
        self.data.sync_all()?;
        self.log.flush()?;
        Ok((self.data, self.log))
    }
}
