//! Circular sample buffer
//!
//! Holds the most recent `buffer_len` sample columns of a stream together with
//! a parallel marker-position matrix. Absolute sample indices are 1-based: the
//! first sample ever written is sample 1 and `smax` is the newest one.

use serde::{Deserialize, Serialize};

/// An event marker attached to a sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecord {
    /// Marker type label
    #[serde(rename = "type")]
    pub kind: String,

    /// Fractional offset within the sample (0.0 means on the sample)
    pub latency: f64,
}

impl MarkerRecord {
    pub fn new(kind: impl Into<String>, latency: f64) -> Self {
        Self {
            kind: kind.into(),
            latency,
        }
    }
}

/// A marker to attach while pushing a block of samples
#[derive(Debug, Clone)]
pub struct PendingMarker {
    /// Column within the pushed block (0-based)
    pub column: usize,
    /// Channel row the marker is attached to
    pub channel: usize,
    pub record: MarkerRecord,
}

/// Fixed-capacity ring of sample columns
#[derive(Debug)]
pub struct RingBuffer {
    nbchan: usize,
    buffer_len: usize,
    stream_id: u64,

    /// Slot-major samples: `data[slot * nbchan + channel]`
    data: Vec<f32>,

    /// Marker ids with the same layout as `data` (0 = no marker)
    marker_pos: Vec<u64>,

    /// Marker records keyed by id; id `n` lives at index `(n - 1) % len`.
    /// Every resident marker occupies its own position, so one entry per
    /// position is enough to keep all of them resolvable.
    marker_buffer: Vec<Option<(u64, MarkerRecord)>>,

    /// Id handed to the next marker
    next_marker_id: u64,

    /// Highest absolute sample index written so far
    smax: u64,
}

impl RingBuffer {
    /// Create an empty buffer
    pub fn new(nbchan: usize, buffer_len: usize, stream_id: u64) -> Self {
        Self {
            nbchan,
            buffer_len,
            stream_id,
            data: vec![0.0; nbchan * buffer_len],
            marker_pos: vec![0; nbchan * buffer_len],
            marker_buffer: vec![None; (nbchan * buffer_len).max(1)],
            next_marker_id: 1,
            smax: 0,
        }
    }

    pub fn nbchan(&self) -> usize {
        self.nbchan
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Id of the stream instance that owns the current contents
    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    /// Watermark: highest absolute sample index written
    pub fn smax(&self) -> u64 {
        self.smax
    }

    /// Physical slot holding absolute sample `index` (1-based)
    pub fn slot_of(&self, index: u64) -> usize {
        ((index - 1) % self.buffer_len as u64) as usize
    }

    /// Whether absolute sample `index` is still resident
    pub fn is_resident(&self, index: u64) -> bool {
        index >= 1 && index <= self.smax && index + self.buffer_len as u64 > self.smax
    }

    /// All channels of one slot
    pub fn column(&self, slot: usize) -> &[f32] {
        let start = slot * self.nbchan;
        &self.data[start..start + self.nbchan]
    }

    /// Marker ids of one slot, one per channel
    pub fn marker_column(&self, slot: usize) -> &[u64] {
        let start = slot * self.nbchan;
        &self.marker_pos[start..start + self.nbchan]
    }

    /// Resolve a marker id
    pub fn marker(&self, id: u64) -> Option<&MarkerRecord> {
        if id == 0 {
            return None;
        }
        match &self.marker_buffer[self.marker_index(id)] {
            Some((stored, record)) if *stored == id => Some(record),
            _ => None,
        }
    }

    fn marker_index(&self, id: u64) -> usize {
        ((id - 1) % self.marker_buffer.len() as u64) as usize
    }

    /// Append sample columns and markers, advancing the watermark
    ///
    /// `samples` is column-major (all channels of the first sample, then the
    /// second, ...). A trailing partial column is ignored. When the block is
    /// longer than the buffer only its last `buffer_len` columns are stored.
    /// Markers that point outside the stored columns or at an unknown channel
    /// are dropped; of two markers on the same sample and channel the later
    /// one wins.
    pub fn push(&mut self, samples: &[f32], markers: &[PendingMarker]) -> usize {
        if self.nbchan == 0 || self.buffer_len == 0 {
            return 0;
        }

        let columns = samples.len() / self.nbchan;
        let skipped = columns.saturating_sub(self.buffer_len);
        let first = self.smax + 1;

        for (offset, column) in samples.chunks_exact(self.nbchan).enumerate().skip(skipped) {
            let slot = self.slot_of(first + offset as u64);
            let start = slot * self.nbchan;
            self.data[start..start + self.nbchan].copy_from_slice(column);
            self.marker_pos[start..start + self.nbchan].fill(0);
        }

        let first_id = self.next_marker_id;
        for marker in markers {
            if marker.column < skipped || marker.column >= columns || marker.channel >= self.nbchan {
                tracing::debug!(
                    "Dropping marker '{}' outside stored columns",
                    marker.record.kind
                );
                continue;
            }
            let pos = self.slot_of(first + marker.column as u64) * self.nbchan + marker.channel;
            let id = match self.marker_pos[pos] {
                existing if existing >= first_id => existing,
                _ => {
                    let id = self.next_marker_id;
                    self.next_marker_id += 1;
                    id
                }
            };
            let index = self.marker_index(id);
            self.marker_buffer[index] = Some((id, marker.record.clone()));
            self.marker_pos[pos] = id;
        }

        self.smax += columns as u64;
        columns
    }

    /// Forget all samples and markers and take a new stream id
    pub fn reset(&mut self, stream_id: u64) {
        self.stream_id = stream_id;
        self.data.fill(0.0);
        self.marker_pos.fill(0);
        self.marker_buffer.fill(None);
        self.next_marker_id = 1;
        self.smax = 0;
    }
}
