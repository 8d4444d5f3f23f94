//! Recording session
//!
//! Everything one recording owns between start and finalize: the source
//! handle, the consumer cursor, the open files and the header snapshot.
//! Ticks are synchronous; the coordinator decides when they run.

use super::appender::BinaryAppender;
use super::extractor::extract_chunk;
use super::state::RecorderConfig;
use crate::dataset::{DatasetFinalizer, DatasetHeader, DatasetPaths};
use crate::stream::{RingBuffer, StreamSource};
use crate::utils::error::{RecorderError, RecorderResult};
use crate::utils::paths::{ensure_writable_parent, resolve_output_base};
use std::path::Path;
use std::sync::Arc;

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No new samples
    Idle,
    /// A chunk was persisted
    Appended { samples: usize, dropped: u64 },
    /// The source was torn down or replaced; nothing was read
    SourceLost,
}

pub struct RecordingSession {
    source: Arc<dyn StreamSource>,
    stream_id: u64,

    /// Absolute index of the last source sample consumed (written or dropped)
    cursor: u64,
    dropped: u64,

    appender: BinaryAppender,
    finalizer: DatasetFinalizer,
}

impl RecordingSession {
    /// Validate the configuration, open the output files and snapshot the header
    ///
    /// On error no output files are left behind.
    pub fn open(
        source: Arc<dyn StreamSource>,
        config: &RecorderConfig,
        data_dir: &Path,
    ) -> RecorderResult<Self> {
        config.validate()?;

        if source.name() != config.source_stream_name {
            return Err(RecorderError::Configuration(format!(
                "Configured stream '{}' but source is '{}'",
                config.source_stream_name,
                source.name()
            )));
        }
        if !source.is_valid() {
            return Err(RecorderError::SourceUnavailable(source.name().to_string()));
        }

        let info = source.info();
        if info.nbchan == 0 || info.buffer_len == 0 || !(info.srate > 0.0) {
            return Err(RecorderError::Configuration(format!(
                "Stream '{}' has unusable geometry: {} channels, {} samples buffered, {} Hz",
                source.name(),
                info.nbchan,
                info.buffer_len,
                info.srate
            )));
        }

        let base = resolve_output_base(&config.output_file_path, data_dir)?;
        ensure_writable_parent(&base)?;
        let paths = DatasetPaths::from_base(&base);

        let setname = base
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let header = DatasetHeader::new(
            setname,
            source.name().to_string(),
            &info,
            paths.data_file_name(),
        );

        let created: Vec<&Path> = [&paths.data, &paths.event_log, &paths.header]
            .into_iter()
            .filter(|path| !path.exists())
            .map(|path| path.as_path())
            .collect();

        let opened = BinaryAppender::create(&paths.data, &paths.event_log, info.nbchan)
            .and_then(|appender| {
                let finalizer = DatasetFinalizer::new(header, paths.clone());
                finalizer.write_initial()?;
                Ok((appender, finalizer))
            });

        let (appender, finalizer) = match opened {
            Ok(parts) => parts,
            Err(e) => {
                for path in created {
                    let _ = std::fs::remove_file(path);
                }
                return Err(RecorderError::Configuration(format!(
                    "Cannot create dataset at {:?}: {}",
                    base, e
                )));
            }
        };

        let stream_id = source.stream_id();
        tracing::info!(
            "Recording stream '{}' (id {}) to {:?}",
            source.name(),
            stream_id,
            paths.header
        );

        Ok(Self {
            source,
            stream_id,
            cursor: 0,
            dropped: 0,
            appender,
            finalizer,
        })
    }

    /// Copy everything new from the ring buffer to disk
    pub fn tick(&mut self) -> RecorderResult<TickOutcome> {
        if !self.source.is_valid() {
            return Ok(TickOutcome::SourceLost);
        }

        let expected_id = self.stream_id;
        let cursor = self.cursor;
        let mut replaced = false;
        let mut chunk = None;
        self.source.with_buffer(&mut |buffer: &RingBuffer| {
            if buffer.stream_id() != expected_id {
                replaced = true;
            } else {
                chunk = extract_chunk(buffer, cursor);
            }
        });

        if replaced {
            return Ok(TickOutcome::SourceLost);
        }
        let Some(chunk) = chunk else {
            return Ok(TickOutcome::Idle);
        };

        if chunk.dropped > 0 {
            tracing::warn!(
                "Recorder fell behind stream '{}': {} samples lost before sample {}",
                self.source.name(),
                chunk.dropped,
                chunk.first_sample
            );
        }

        let samples = self.appender.append(&chunk)?;
        self.cursor = chunk.last_sample();
        self.dropped += chunk.dropped;

        tracing::debug!(
            "Appended {} samples ({} total)",
            samples,
            self.appender.samples_written()
        );

        Ok(TickOutcome::Appended {
            samples,
            dropped: chunk.dropped,
        })
    }

    pub fn samples_written(&self) -> u64 {
        self.appender.samples_written()
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped
    }

    pub fn srate(&self) -> f64 {
        self.finalizer.header().srate
    }

    pub fn paths(&self) -> &DatasetPaths {
        self.finalizer.paths()
    }

    /// Close the files and write the final header
    pub fn finalize(self) -> RecorderResult<DatasetHeader> {
        self.finalizer.finalize(self.appender, self.dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::read_dataset;
    use crate::stream::{MarkerRecord, PendingMarker, StreamHandle, StreamInfo};
    use tempfile::tempdir;

    fn stream(nbchan: usize, buffer_len: usize) -> StreamHandle {
        StreamHandle::new(
            "eeg",
            StreamInfo {
                nbchan,
                srate: 256.0,
                xmin: 0.0,
                buffer_len,
            },
        )
    }

    fn ramp(nbchan: usize, from: u64, count: usize) -> Vec<f32> {
        (0..count)
            .flat_map(|col| (0..nbchan).map(move |ch| ((from + col as u64) * 10 + ch as u64) as f32))
            .collect()
    }

    fn open(handle: &StreamHandle, dir: &Path) -> RecordingSession {
        let config = RecorderConfig::new("eeg", "run");
        RecordingSession::open(handle.as_source(), &config, dir).unwrap()
    }

    #[test]
    fn test_three_ticks_of_256() {
        let dir = tempdir().unwrap();
        let handle = stream(4, 1024);
        let mut session = open(&handle, dir.path());

        for tick in 0..3u64 {
            handle.push(&ramp(4, tick * 256, 256), &[]);
            let outcome = session.tick().unwrap();
            assert_eq!(outcome, TickOutcome::Appended { samples: 256, dropped: 0 });
        }
        assert_eq!(session.tick().unwrap(), TickOutcome::Idle);

        let paths = session.paths().clone();
        let header = session.finalize().unwrap();
        assert_eq!(header.pnts, 768);
        assert_eq!(std::fs::metadata(&paths.data).unwrap().len(), 12288);
        assert!(!paths.event_log.exists());

        // Readback matches what went through the ring buffer
        let (_, rows) = read_dataset(&paths.header).unwrap();
        let expected = ramp(4, 0, 768);
        for (col, column) in expected.chunks_exact(4).enumerate() {
            for ch in 0..4 {
                assert_eq!(rows[ch][col], column[ch]);
            }
        }
    }

    #[test]
    fn test_markers_logged_then_folded() {
        let dir = tempdir().unwrap();
        let handle = stream(1, 1024);
        let mut session = open(&handle, dir.path());

        let markers = vec![
            PendingMarker {
                column: 9,
                channel: 0,
                record: MarkerRecord::new("stim1", 0.0),
            },
            PendingMarker {
                column: 49,
                channel: 0,
                record: MarkerRecord::new("stim2", 0.0),
            },
        ];
        handle.push(&ramp(1, 0, 64), &markers);
        session.tick().unwrap();

        let paths = session.paths().clone();
        let log = std::fs::read_to_string(&paths.event_log).unwrap();
        assert_eq!(log, "type\tlatency\nstim1\t10\nstim2\t50\n");

        let header = session.finalize().unwrap();
        let table: Vec<(String, f64, usize)> = header
            .events
            .iter()
            .map(|e| (e.kind.clone(), e.latency, e.urevent))
            .collect();
        assert_eq!(
            table,
            vec![("stim1".to_string(), 10.0, 1), ("stim2".to_string(), 50.0, 2)]
        );
    }

    #[test]
    fn test_stream_replaced_between_ticks() {
        let dir = tempdir().unwrap();
        let handle = stream(2, 512);
        let mut session = open(&handle, dir.path());

        handle.push(&ramp(2, 0, 100), &[]);
        session.tick().unwrap();
        handle.push(&ramp(2, 100, 100), &[]);
        session.tick().unwrap();

        handle.replace();
        handle.push(&ramp(2, 0, 100), &[]);
        assert_eq!(session.tick().unwrap(), TickOutcome::SourceLost);

        let header = session.finalize().unwrap();
        assert_eq!(header.pnts, 200);
    }

    #[test]
    fn test_closed_source_is_lost() {
        let dir = tempdir().unwrap();
        let handle = stream(2, 64);
        let mut session = open(&handle, dir.path());
        handle.close();
        assert_eq!(session.tick().unwrap(), TickOutcome::SourceLost);
    }

    #[test]
    fn test_backlog_beyond_capacity_drops_oldest() {
        let dir = tempdir().unwrap();
        let handle = stream(1, 1024);
        let mut session = open(&handle, dir.path());

        handle.push(&ramp(1, 0, 2000), &[]);
        assert_eq!(
            session.tick().unwrap(),
            TickOutcome::Appended { samples: 1024, dropped: 976 }
        );

        // Recording continues without re-reading already consumed samples
        handle.push(&ramp(1, 2000, 10), &[]);
        assert_eq!(
            session.tick().unwrap(),
            TickOutcome::Appended { samples: 10, dropped: 0 }
        );

        let header = session.finalize().unwrap();
        assert_eq!(header.pnts, 1034);
        assert_eq!(header.dropped_samples, 976);
    }

    #[test]
    fn test_open_rejects_mismatched_name() {
        let dir = tempdir().unwrap();
        let handle = stream(2, 64);
        let config = RecorderConfig::new("emg", "run");
        let err = RecordingSession::open(handle.as_source(), &config, dir.path()).err().unwrap();
        assert!(matches!(err, RecorderError::Configuration(_)));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_open_rejects_unwritable_destination() {
        let dir = tempdir().unwrap();
        // A regular file where a directory is needed
        std::fs::write(dir.path().join("blocker"), b"x").unwrap();
        let handle = stream(2, 64);
        let config = RecorderConfig::new("eeg", "blocker/run");
        let err = RecordingSession::open(handle.as_source(), &config, dir.path()).err().unwrap();
        assert!(matches!(err, RecorderError::Configuration(_)));
    }

    #[test]
    fn test_open_rejects_closed_source() {
        let dir = tempdir().unwrap();
        let handle = stream(2, 64);
        handle.close();
        let config = RecorderConfig::new("eeg", "run");
        let err = RecordingSession::open(handle.as_source(), &config, dir.path()).err().unwrap();
        assert!(matches!(err, RecorderError::SourceUnavailable(_)));
    }

    #[test]
    fn test_failed_open_keeps_preexisting_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("run.set.json"), "old").unwrap();
        // The header's temp file path is taken by a directory, so the header write fails
        std::fs::create_dir(dir.path().join("run.set.json.tmp")).unwrap();

        let handle = stream(2, 64);
        let config = RecorderConfig::new("eeg", "run");
        let err = RecordingSession::open(handle.as_source(), &config, dir.path()).err().unwrap();
        assert!(matches!(err, RecorderError::Configuration(_)));

        assert_eq!(std::fs::read_to_string(dir.path().join("run.set.json")).unwrap(), "old");
        assert!(!dir.path().join("run.fdt").exists());
        assert!(!dir.path().join("run.events.tsv").exists());
    }

    #[test]
    fn test_marker_type_with_line_break_keeps_events() {
        let dir = tempdir().unwrap();
        let handle = stream(1, 64);
        let mut session = open(&handle, dir.path());

        let markers = vec![
            PendingMarker {
                column: 1,
                channel: 0,
                record: MarkerRecord::new("good", 0.0),
            },
            PendingMarker {
                column: 3,
                channel: 0,
                record: MarkerRecord::new("bad\nline", 0.0),
            },
        ];
        handle.push(&ramp(1, 0, 8), &markers);
        session.tick().unwrap();

        let paths = session.paths().clone();
        let header = session.finalize().unwrap();
        let table: Vec<(String, f64)> = header
            .events
            .iter()
            .map(|e| (e.kind.clone(), e.latency))
            .collect();
        assert_eq!(
            table,
            vec![("good".to_string(), 2.0), ("bad line".to_string(), 4.0)]
        );
        assert!(!paths.event_log.exists());
    }
}
