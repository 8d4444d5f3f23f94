//! Recording system module
//!
//! This module implements the stream-to-disk recorder:
//! - chunk extraction from the ring buffer
//! - binary and event-log appending
//! - a session that ties one recording's files together
//! - the coordinator running sessions on a periodic task

pub mod appender;
pub mod coordinator;
pub mod extractor;
pub mod session;
pub mod state;

pub use coordinator::{Recorder, RecorderEvent};
pub use session::{RecordingSession, TickOutcome};
pub use state::{RecorderConfig, RecorderState, RecordingSummary, StopReason};
