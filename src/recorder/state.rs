//! Recorder state management
//!
//! Defines the recorder state machine, its configuration and the summary it
//! produces when it finalizes.

use crate::dataset::DatasetHeader;
use crate::utils::error::{RecorderError, RecorderResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current state of a recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    /// Files are open, waiting for the first tick
    Initializing,
    /// Ticks are appending data
    Running,
    /// Dataset written; no further ticks
    Finalized,
}

impl Default for RecorderState {
    fn default() -> Self {
        Self::Initializing
    }
}

/// Why a recording ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "detail")]
pub enum StopReason {
    /// `stop()` was called
    Requested,
    /// The source stream was torn down or replaced
    SourceLost,
    /// A tick failed; the message is the error that ended it
    Failed(String),
}

/// Configuration for starting a recorder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderConfig {
    /// Name of the stream to record; must match the injected source
    pub source_stream_name: String,

    /// Destination base name; relative paths resolve under the data directory
    pub output_file_path: String,

    /// Ticks per second
    #[serde(default = "default_update_frequency")]
    pub update_frequency_hz: f64,

    /// Grace period before the first tick
    #[serde(default)]
    pub start_delay_seconds: f64,
}

fn default_update_frequency() -> f64 {
    1.0
}

impl RecorderConfig {
    pub fn new(source_stream_name: impl Into<String>, output_file_path: impl Into<String>) -> Self {
        Self {
            source_stream_name: source_stream_name.into(),
            output_file_path: output_file_path.into(),
            update_frequency_hz: default_update_frequency(),
            start_delay_seconds: 0.0,
        }
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: &Path) -> RecorderResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RecorderError::Configuration(format!("Cannot read config {:?}: {}", path, e))
        })?;
        let config: RecorderConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Check rates and names before any file is touched
    pub fn validate(&self) -> RecorderResult<()> {
        if self.source_stream_name.trim().is_empty() {
            return Err(RecorderError::Configuration(
                "Source stream name is empty".to_string(),
            ));
        }
        if !self.update_frequency_hz.is_finite() || self.update_frequency_hz <= 0.0 {
            return Err(RecorderError::Configuration(format!(
                "Update frequency must be positive, got {}",
                self.update_frequency_hz
            )));
        }
        if !self.start_delay_seconds.is_finite() || self.start_delay_seconds < 0.0 {
            return Err(RecorderError::Configuration(format!(
                "Start delay must be non-negative, got {}",
                self.start_delay_seconds
            )));
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.update_frequency_hz)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_secs_f64(self.start_delay_seconds)
    }
}

/// Result of a finalized recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    /// Path of the dataset header file
    pub header_path: PathBuf,

    /// Path of the binary data file
    pub data_path: PathBuf,

    pub stop_reason: StopReason,

    /// The final header as written to disk
    pub header: DatasetHeader,
}
