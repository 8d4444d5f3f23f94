//! Live stream handle
//!
//! The producer side owns a [`StreamHandle`] and pushes samples into it; the
//! recorder only sees it through the read-only [`StreamSource`] trait.

use super::ring::{PendingMarker, RingBuffer};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

fn next_stream_id() -> u64 {
    NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed)
}

/// Static description of a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    /// Number of channels
    pub nbchan: usize,

    /// Sample rate in Hz
    pub srate: f64,

    /// Time of the first sample in seconds
    pub xmin: f64,

    /// Ring buffer capacity in samples
    pub buffer_len: usize,
}

/// Read-only view of a live stream, as consumed by the recorder
pub trait StreamSource: Send + Sync {
    /// Stream name
    fn name(&self) -> &str;

    /// Whether the stream still exists (false once torn down)
    fn is_valid(&self) -> bool;

    /// Current stream instance id
    fn stream_id(&self) -> u64;

    /// Channel count, rate and buffer geometry
    fn info(&self) -> StreamInfo;

    /// Run `f` against the ring buffer under a read lock
    fn with_buffer(&self, f: &mut dyn FnMut(&RingBuffer));
}

struct StreamInner {
    name: String,
    info: StreamInfo,
    valid: AtomicBool,
    buffer: RwLock<RingBuffer>,
}

/// Shared handle to a live stream
#[derive(Clone)]
pub struct StreamHandle {
    inner: Arc<StreamInner>,
}

impl StreamHandle {
    /// Create a new stream with an empty ring buffer
    pub fn new(name: impl Into<String>, info: StreamInfo) -> Self {
        let buffer = RingBuffer::new(info.nbchan, info.buffer_len, next_stream_id());
        Self {
            inner: Arc::new(StreamInner {
                name: name.into(),
                info,
                valid: AtomicBool::new(true),
                buffer: RwLock::new(buffer),
            }),
        }
    }

    /// Push column-major samples and markers; returns the columns written
    pub fn push(&self, samples: &[f32], markers: &[PendingMarker]) -> usize {
        self.inner.buffer.write().push(samples, markers)
    }

    /// Current watermark
    pub fn smax(&self) -> u64 {
        self.inner.buffer.read().smax()
    }

    /// Restart the stream: new id, empty buffer
    pub fn replace(&self) -> u64 {
        let id = next_stream_id();
        self.inner.buffer.write().reset(id);
        tracing::info!("Stream '{}' replaced, new id {}", self.inner.name, id);
        id
    }

    /// Tear the stream down
    pub fn close(&self) {
        self.inner.valid.store(false, Ordering::Release);
        tracing::info!("Stream '{}' closed", self.inner.name);
    }

    /// Box this handle as a recorder source
    pub fn as_source(&self) -> Arc<dyn StreamSource> {
        Arc::new(self.clone())
    }
}

impl StreamSource for StreamHandle {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::Acquire)
    }

    fn stream_id(&self) -> u64 {
        self.inner.buffer.read().stream_id()
    }

    fn info(&self) -> StreamInfo {
        self.inner.info.clone()
    }

    fn with_buffer(&self, f: &mut dyn FnMut(&RingBuffer)) {
        let buffer = self.inner.buffer.read();
        f(&buffer);
    }
}
