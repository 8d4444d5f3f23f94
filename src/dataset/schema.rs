//! Dataset schema definitions
//!
//! The header record written next to the binary data file. It is captured
//! when recording starts and completed by the finalizer.

use crate::stream::StreamInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Format tag stored in every header
pub const DATASET_FORMAT: &str = "stream-recorder-v1";

/// One entry of the final event table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEvent {
    #[serde(rename = "type")]
    pub kind: String,

    /// 1-based sample position in the data file, possibly fractional
    pub latency: f64,

    /// 1-based index in recording order
    pub urevent: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetHeader {
    pub id: Uuid,
    pub format: String,
    pub version: String,

    /// Dataset name, taken from the output file name
    pub setname: String,

    /// Name of the stream the data was recorded from
    pub source_stream: String,

    pub nbchan: usize,
    pub srate: f64,
    pub xmin: f64,
    pub xmax: f64,
    pub pnts: u64,

    /// Binary data file name, relative to the header file
    pub data_file: String,

    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,

    /// Samples lost because the recorder fell behind the producer
    #[serde(default)]
    pub dropped_samples: u64,

    #[serde(default)]
    pub events: Vec<DatasetEvent>,
}

impl DatasetHeader {
    /// Snapshot a header at recording start
    pub fn new(setname: String, source_stream: String, info: &StreamInfo, data_file: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            format: DATASET_FORMAT.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            setname,
            source_stream,
            nbchan: info.nbchan,
            srate: info.srate,
            xmin: info.xmin,
            xmax: info.xmin,
            pnts: 0,
            data_file,
            start_time: Utc::now(),
            end_time: None,
            dropped_samples: 0,
            events: Vec::new(),
        }
    }

    /// Set the sample count and derive `xmax`
    pub fn set_pnts(&mut self, pnts: u64) {
        self.pnts = pnts;
        self.xmax = if pnts == 0 || self.srate <= 0.0 {
            self.xmin
        } else {
            self.xmin + (pnts - 1) as f64 / self.srate
        };
    }

    /// Whether the finalizer has completed this header
    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }

    /// Recorded duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.srate <= 0.0 {
            0.0
        } else {
            self.pnts as f64 / self.srate
        }
    }
}
