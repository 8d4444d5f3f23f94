//! Dataset finalization
//!
//! Folds the accumulated data file and event log into the header record.
//! The finalizer is consumed by [`DatasetFinalizer::finalize`], so a dataset
//! can only be completed once.

use super::file::{parse_event_log, write_header, DatasetPaths};
use super::schema::DatasetHeader;
use crate::recorder::appender::BinaryAppender;
use crate::utils::error::RecorderResult;
use chrono::Utc;
use std::fs;
use std::io::{Read, Seek, SeekFrom};

/// Owns the header snapshot until the recording is finalized
#[derive(Debug)]
pub struct DatasetFinalizer {
    header: DatasetHeader,
    paths: DatasetPaths,
}

impl DatasetFinalizer {
    pub fn new(header: DatasetHeader, paths: DatasetPaths) -> Self {
        Self { header, paths }
    }

    pub fn header(&self) -> &DatasetHeader {
        &self.header
    }

    pub fn paths(&self) -> &DatasetPaths {
        &self.paths
    }

    /// Persist the start-time snapshot so an interrupted recording still has a header
    pub fn write_initial(&self) -> RecorderResult<()> {
        write_header(&self.header, &self.paths.header)?;
        Ok(())
    }

    /// Complete the header from the files on disk and remove the event log
    pub fn finalize(
        mut self,
        appender: BinaryAppender,
        dropped_samples: u64,
    ) -> RecorderResult<DatasetHeader> {
        let pnts = appender.samples_on_disk()?;
        self.header.set_pnts(pnts);
        self.header.end_time = Some(Utc::now());
        self.header.dropped_samples = dropped_samples;

        let (data, mut log) = appender.finish()?;
        drop(data);

        log.seek(SeekFrom::Start(0))?;
        let mut content = String::new();
        log.read_to_string(&mut content)?;
        drop(log);

        let mut events = parse_event_log(&content);
        events.sort_by(|a, b| a.latency.total_cmp(&b.latency));
        for (i, event) in events.iter_mut().enumerate() {
            event.urevent = i + 1;
        }
        if !events.is_empty() {
            tracing::debug!("Folding {} events into dataset", events.len());
        }
        self.header.events = events;

        // The log is only discarded once its events are in a persisted header
        write_header(&self.header, &self.paths.header)?;
        if let Err(e) = fs::remove_file(&self.paths.event_log) {
            tracing::warn!("Could not remove event log {:?}: {}", self.paths.event_log, e);
        }

        tracing::info!(
            "Finalized dataset '{}': {} points, {} events, {} samples dropped",
            self.header.setname,
            self.header.pnts,
            self.header.events.len(),
            self.header.dropped_samples
        );

        Ok(self.header)
    }
}
