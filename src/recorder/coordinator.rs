//! Recording coordinator
//!
//! Runs a [`RecordingSession`] on a periodic tokio task and manages the
//! recorder lifecycle: start delay, ticks, cancellation and finalize-once.

use super::session::{RecordingSession, TickOutcome};
use super::state::{RecorderConfig, RecorderState, RecordingSummary, StopReason};
use crate::stream::StreamSource;
use crate::utils::error::{RecorderError, RecorderResult};
use crate::utils::paths::default_data_dir;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Events emitted during recording
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// First tick is about to run
    Started,
    /// A chunk reached disk
    ChunkWritten { samples: usize, total: u64 },
    /// Samples were lost because the recorder fell behind
    DataGap { dropped: u64 },
    /// The source stream went away
    SourceLost,
    /// A tick failed
    Error(String),
    /// The dataset was finalized with this many points
    Finalized { pnts: u64 },
}

/// State shared between the handle and its task
struct Shared {
    state: RwLock<RecorderState>,
    samples_written: AtomicU64,
    srate: f64,
    start_time: Instant,
}

/// A running recorder
///
/// Dropping a recorder without calling [`Recorder::stop`] still cancels the
/// task, which then finalizes the dataset on its own.
pub struct Recorder {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Option<JoinHandle<RecorderResult<RecordingSummary>>>,
    event_tx: broadcast::Sender<RecorderEvent>,
    header_path: PathBuf,
}

impl Recorder {
    /// Start recording `source`; relative output paths resolve under the user data directory
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(source: Arc<dyn StreamSource>, config: RecorderConfig) -> RecorderResult<Self> {
        let data_dir = if Path::new(config.output_file_path.trim()).is_absolute() {
            PathBuf::new()
        } else {
            default_data_dir()?
        };
        Self::start_in(source, config, &data_dir)
    }

    /// Start recording with an explicit base directory for relative output paths
    pub fn start_in(
        source: Arc<dyn StreamSource>,
        config: RecorderConfig,
        data_dir: &Path,
    ) -> RecorderResult<Self> {
        let session = RecordingSession::open(source, &config, data_dir)?;

        let (event_tx, _) = broadcast::channel(100);
        let shared = Arc::new(Shared {
            state: RwLock::new(RecorderState::Initializing),
            samples_written: AtomicU64::new(0),
            srate: session.srate(),
            start_time: Instant::now(),
        });
        let cancel = CancellationToken::new();
        let header_path = session.paths().header.clone();

        let task = tokio::spawn(run_session(
            session,
            config,
            cancel.clone(),
            shared.clone(),
            event_tx.clone(),
        ));

        Ok(Self {
            shared,
            cancel,
            task: Some(task),
            event_tx,
            header_path,
        })
    }

    /// Get the current recorder state
    pub fn state(&self) -> RecorderState {
        *self.shared.state.read()
    }

    /// Subscribe to recorder events
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.event_tx.subscribe()
    }

    /// Sample columns persisted so far
    pub fn samples_written(&self) -> u64 {
        self.shared.samples_written.load(Ordering::Acquire)
    }

    /// Recorded duration in seconds, from the persisted sample count
    pub fn duration_secs(&self) -> f64 {
        self.samples_written() as f64 / self.shared.srate
    }

    /// Wall-clock time since the recorder started
    pub fn elapsed_secs(&self) -> f64 {
        self.shared.start_time.elapsed().as_secs_f64()
    }

    /// Path of the dataset header file
    pub fn header_path(&self) -> &Path {
        &self.header_path
    }

    /// Whether the task has already finalized on its own
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    /// Stop recording and finalize the dataset
    ///
    /// A second call returns [`RecorderError::AlreadyFinalized`].
    pub async fn stop(&mut self) -> RecorderResult<RecordingSummary> {
        let task = self.task.take().ok_or(RecorderError::AlreadyFinalized)?;
        tracing::info!("Stopping recorder for {:?}", self.header_path);
        self.cancel.cancel();
        join(task).await
    }

    /// Wait until the recorder finalizes on its own (source lost or failure)
    pub async fn wait(&mut self) -> RecorderResult<RecordingSummary> {
        let task = self.task.take().ok_or(RecorderError::AlreadyFinalized)?;
        join(task).await
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn join(
    task: JoinHandle<RecorderResult<RecordingSummary>>,
) -> RecorderResult<RecordingSummary> {
    task.await
        .map_err(|e| RecorderError::TaskFailed(e.to_string()))?
}

/// The periodic task: delay, tick until told to stop, then finalize once
///
/// Ticks and finalize touch the filesystem, so they run on the blocking pool
/// with the session moved in and handed back.
async fn run_session(
    mut session: RecordingSession,
    config: RecorderConfig,
    cancel: CancellationToken,
    shared: Arc<Shared>,
    events: broadcast::Sender<RecorderEvent>,
) -> RecorderResult<RecordingSummary> {
    let delayed = tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(config.start_delay()) => true,
    };

    let reason = if !delayed {
        StopReason::Requested
    } else {
        *shared.state.write() = RecorderState::Running;
        let _ = events.send(RecorderEvent::Started);
        tracing::info!("Recorder running at {} Hz", config.update_frequency_hz);

        let mut ticker = tokio::time::interval(config.tick_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break StopReason::Requested,
                _ = ticker.tick() => {
                    let (returned, stop) = match handle_tick(session, &shared, &events).await {
                        Ok(ticked) => ticked,
                        Err(e) => return Err(abandon(&shared, &events, e)),
                    };
                    session = returned;
                    if let Some(reason) = stop {
                        break reason;
                    }
                }
            }
        }
    };

    // Pick up whatever arrived since the last tick before closing the files
    if reason == StopReason::Requested {
        session = match handle_tick(session, &shared, &events).await {
            Ok((returned, _)) => returned,
            Err(e) => return Err(abandon(&shared, &events, e)),
        };
    }

    let paths = session.paths().clone();
    let result = tokio::task::spawn_blocking(move || session.finalize())
        .await
        .unwrap_or_else(|e| Err(RecorderError::TaskFailed(e.to_string())));
    *shared.state.write() = RecorderState::Finalized;

    let header = match result {
        Ok(header) => header,
        Err(e) => {
            tracing::error!("Finalizing {:?} failed: {}", paths.header, e);
            let _ = events.send(RecorderEvent::Error(e.to_string()));
            return Err(e);
        }
    };
    let _ = events.send(RecorderEvent::Finalized { pnts: header.pnts });

    Ok(RecordingSummary {
        header_path: paths.header,
        data_path: paths.data,
        stop_reason: reason,
        header,
    })
}

/// Run one tick on the blocking pool; a `Some` reason means the recorder has to finalize
///
/// An `Err` means the session itself was lost with the blocking task.
async fn handle_tick(
    session: RecordingSession,
    shared: &Shared,
    events: &broadcast::Sender<RecorderEvent>,
) -> RecorderResult<(RecordingSession, Option<StopReason>)> {
    let (session, outcome) = tokio::task::spawn_blocking(move || {
        let mut session = session;
        let outcome = session.tick();
        (session, outcome)
    })
    .await
    .map_err(|e| RecorderError::TaskFailed(e.to_string()))?;

    let stop = match outcome {
        Ok(TickOutcome::Idle) => None,
        Ok(TickOutcome::Appended { samples, dropped }) => {
            let total = session.samples_written();
            shared.samples_written.store(total, Ordering::Release);
            if dropped > 0 {
                let _ = events.send(RecorderEvent::DataGap { dropped });
            }
            let _ = events.send(RecorderEvent::ChunkWritten { samples, total });
            None
        }
        Ok(TickOutcome::SourceLost) => {
            tracing::info!("Source stream gone, finalizing recording");
            let _ = events.send(RecorderEvent::SourceLost);
            Some(StopReason::SourceLost)
        }
        Err(e) => {
            tracing::error!("Recording tick failed: {}", e);
            let _ = events.send(RecorderEvent::Error(e.to_string()));
            Some(StopReason::Failed(e.to_string()))
        }
    };
    Ok((session, stop))
}

/// Give up on a session that can no longer be finalized
fn abandon(
    shared: &Shared,
    events: &broadcast::Sender<RecorderEvent>,
    error: RecorderError,
) -> RecorderError {
    tracing::error!("Recorder task lost its session: {}", error);
    *shared.state.write() = RecorderState::Finalized;
    let _ = events.send(RecorderEvent::Error(error.to_string()));
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::read_dataset;
    use crate::stream::{RingBuffer, StreamHandle, StreamInfo};
    use std::time::Duration;
    use tempfile::tempdir;

    fn stream() -> StreamHandle {
        StreamHandle::new(
            "eeg",
            StreamInfo {
                nbchan: 4,
                srate: 256.0,
                xmin: 0.0,
                buffer_len: 1024,
            },
        )
    }

    fn fast_config() -> RecorderConfig {
        RecorderConfig {
            update_frequency_hz: 50.0,
            ..RecorderConfig::new("eeg", "run")
        }
    }

    #[tokio::test]
    async fn test_stop_finalizes_and_removes_event_log() {
        let dir = tempdir().unwrap();
        let handle = stream();
        let mut recorder = Recorder::start_in(handle.as_source(), fast_config(), dir.path()).unwrap();

        handle.push(&vec![1.5; 4 * 300], &[]);
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.push(&vec![2.5; 4 * 200], &[]);

        let summary = recorder.stop().await.unwrap();
        assert_eq!(recorder.state(), RecorderState::Finalized);
        assert_eq!(summary.stop_reason, StopReason::Requested);
        assert_eq!(summary.header.pnts, 500);
        assert_eq!(std::fs::metadata(&summary.data_path).unwrap().len(), 4 * 4 * 500);
        assert!(!dir.path().join("run.events.tsv").exists());

        let (_, rows) = read_dataset(&summary.header_path).unwrap();
        assert_eq!(rows[0][0], 1.5);
        assert_eq!(rows[3][499], 2.5);
    }

    #[tokio::test]
    async fn test_second_stop_is_rejected() {
        let dir = tempdir().unwrap();
        let handle = stream();
        let mut recorder = Recorder::start_in(handle.as_source(), fast_config(), dir.path()).unwrap();

        recorder.stop().await.unwrap();
        assert!(matches!(recorder.stop().await, Err(RecorderError::AlreadyFinalized)));
        assert!(matches!(recorder.wait().await, Err(RecorderError::AlreadyFinalized)));
    }

    #[tokio::test]
    async fn test_replaced_source_finalizes_without_error() {
        let dir = tempdir().unwrap();
        let handle = stream();
        let mut recorder = Recorder::start_in(handle.as_source(), fast_config(), dir.path()).unwrap();
        let mut events = recorder.subscribe();

        handle.push(&vec![0.0; 4 * 128], &[]);
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.replace();

        let summary = tokio::time::timeout(Duration::from_secs(5), recorder.wait())
            .await
            .expect("recorder should finalize after the stream is replaced")
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::SourceLost);
        assert_eq!(summary.header.pnts, 128);

        let mut saw_source_lost = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, RecorderEvent::SourceLost) {
                saw_source_lost = true;
            }
        }
        assert!(saw_source_lost);
    }

    #[tokio::test]
    async fn test_stop_during_start_delay() {
        let dir = tempdir().unwrap();
        let handle = stream();
        let config = RecorderConfig {
            start_delay_seconds: 30.0,
            ..fast_config()
        };
        let mut recorder = Recorder::start_in(handle.as_source(), config, dir.path()).unwrap();
        assert_eq!(recorder.state(), RecorderState::Initializing);

        handle.push(&vec![0.0; 4 * 10], &[]);
        let summary = recorder.stop().await.unwrap();
        assert_eq!(summary.header.pnts, 10);
        assert!(summary.header.is_finalized());
    }

    #[tokio::test]
    async fn test_start_error_creates_no_files() {
        let dir = tempdir().unwrap();
        let handle = stream();
        let config = RecorderConfig {
            update_frequency_hz: -1.0,
            ..fast_config()
        };
        let result = Recorder::start_in(handle.as_source(), config, dir.path());
        assert!(matches!(result, Err(RecorderError::Configuration(_))));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    /// Source whose ring buffer can be swapped under the same stream id,
    /// advertising a fixed three-channel geometry
    struct SwappableSource {
        stream_id: u64,
        buffer: parking_lot::RwLock<RingBuffer>,
    }

    impl SwappableSource {
        fn new(buffer: RingBuffer) -> Arc<Self> {
            Arc::new(Self {
                stream_id: buffer.stream_id(),
                buffer: parking_lot::RwLock::new(buffer),
            })
        }
    }

    impl StreamSource for SwappableSource {
        fn name(&self) -> &str {
            "eeg"
        }

        fn is_valid(&self) -> bool {
            true
        }

        fn stream_id(&self) -> u64 {
            self.stream_id
        }

        fn info(&self) -> StreamInfo {
            StreamInfo {
                nbchan: 3,
                srate: 100.0,
                xmin: 0.0,
                buffer_len: 64,
            }
        }

        fn with_buffer(&self, f: &mut dyn FnMut(&RingBuffer)) {
            f(&self.buffer.read());
        }
    }

    #[tokio::test]
    async fn test_write_failure_finalizes_with_reason() {
        let dir = tempdir().unwrap();
        let mut buffer = RingBuffer::new(2, 64, 9001);
        buffer.push(&[0.5; 2 * 8], &[]);
        let source = SwappableSource::new(buffer);

        let mut recorder = Recorder::start_in(source, fast_config(), dir.path()).unwrap();
        let summary = tokio::time::timeout(Duration::from_secs(5), recorder.wait())
            .await
            .expect("recorder should finalize after a failed write")
            .unwrap();

        assert!(matches!(summary.stop_reason, StopReason::Failed(_)));
        assert_eq!(summary.header.pnts, 0);
        assert!(summary.header.is_finalized());
        assert_eq!(recorder.state(), RecorderState::Finalized);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_earlier_chunks() {
        let dir = tempdir().unwrap();
        let mut buffer = RingBuffer::new(3, 64, 9002);
        buffer.push(&[1.0; 3 * 10], &[]);
        let source = SwappableSource::new(buffer);

        let mut recorder = Recorder::start_in(source.clone(), fast_config(), dir.path()).unwrap();
        for _ in 0..250 {
            if recorder.samples_written() == 10 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(recorder.samples_written(), 10);

        let mut narrower = RingBuffer::new(2, 64, 9002);
        narrower.push(&[2.0; 2 * 20], &[]);
        *source.buffer.write() = narrower;

        let summary = tokio::time::timeout(Duration::from_secs(5), recorder.wait())
            .await
            .expect("recorder should finalize after a failed write")
            .unwrap();
        assert!(matches!(summary.stop_reason, StopReason::Failed(_)));
        assert_eq!(summary.header.pnts, 10);
        assert_eq!(std::fs::metadata(&summary.data_path).unwrap().len(), 4 * 3 * 10);

        let (_, rows) = read_dataset(&summary.header_path).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], vec![1.0; 10]);
    }
}
