//! Dataset file read/write operations
//!
//! A dataset with base path `B` is made of:
//! - B.set.json: the header record
//! - B.fdt: raw little-endian f32 samples, one column per sample
//! - B.events.tsv: the event log, only present while recording

use super::schema::{DatasetEvent, DatasetHeader};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const HEADER_EXTENSION: &str = "set.json";
pub const DATA_EXTENSION: &str = "fdt";
pub const EVENT_LOG_EXTENSION: &str = "events.tsv";

/// Dataset-related errors
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Data file is {actual} bytes, header describes {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Dataset is not finalized: {0}")]
    NotFinalized(String),
}

/// The files belonging to one dataset
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetPaths {
    pub header: PathBuf,
    pub data: PathBuf,
    pub event_log: PathBuf,
}

fn with_suffix(base: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

impl DatasetPaths {
    pub fn from_base(base: &Path) -> Self {
        Self {
            header: with_suffix(base, HEADER_EXTENSION),
            data: with_suffix(base, DATA_EXTENSION),
            event_log: with_suffix(base, EVENT_LOG_EXTENSION),
        }
    }

    /// Data file name as referenced from the header
    pub fn data_file_name(&self) -> String {
        self.data
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Write a header atomically (temp file, then rename)
pub fn write_header(header: &DatasetHeader, path: &Path) -> Result<(), DatasetError> {
    let content = serde_json::to_string_pretty(header)?;
    let tmp = with_suffix(path, "tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;

    tracing::debug!("Saved dataset header '{}' to {:?}", header.setname, path);

    Ok(())
}

/// Read a header record
pub fn read_header(path: &Path) -> Result<DatasetHeader, DatasetError> {
    let content = fs::read_to_string(path)?;
    let header: DatasetHeader = serde_json::from_str(&content)?;
    Ok(header)
}

/// Load a finalized dataset: header plus samples as `nbchan` rows by `pnts` columns
pub fn read_dataset(header_path: &Path) -> Result<(DatasetHeader, Vec<Vec<f32>>), DatasetError> {
    let header = read_header(header_path)?;
    if !header.is_finalized() {
        return Err(DatasetError::NotFinalized(header.setname));
    }

    let data_path = header_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&header.data_file);
    let bytes = fs::read(&data_path)?;

    let expected = 4 * header.nbchan as u64 * header.pnts;
    if bytes.len() as u64 != expected {
        return Err(DatasetError::SizeMismatch {
            expected,
            actual: bytes.len() as u64,
        });
    }

    let mut rows = vec![Vec::with_capacity(header.pnts as usize); header.nbchan];
    for (i, value) in bytes.chunks_exact(4).enumerate() {
        let value = f32::from_le_bytes([value[0], value[1], value[2], value[3]]);
        rows[i % header.nbchan].push(value);
    }

    tracing::debug!(
        "Loaded dataset '{}': {} channels, {} points, {} events",
        header.setname,
        header.nbchan,
        header.pnts,
        header.events.len()
    );

    Ok((header, rows))
}

/// Parse event-log contents into an ordered event table
///
/// The first line is the column header. Blank lines are skipped, and so are
/// malformed lines, with a warning, so one bad line cannot cost the rest.
pub fn parse_event_log(content: &str) -> Vec<DatasetEvent> {
    let mut events = Vec::new();

    for (index, line) in content.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let Some((kind, latency)) = line.rsplit_once('\t') else {
            tracing::warn!("Skipping event log line {}: missing tab separator", index + 1);
            continue;
        };
        let Ok(latency) = latency.trim().parse::<f64>() else {
            tracing::warn!("Skipping event log line {}: bad latency '{}'", index + 1, latency);
            continue;
        };

        events.push(DatasetEvent {
            kind: kind.to_string(),
            latency,
            urevent: events.len() + 1,
        });
    }

    events
}
