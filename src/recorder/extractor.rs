//! Chunk extraction
//!
//! Works out which samples arrived since the last tick and copies them, with
//! their markers, out of the ring buffer.

use crate::stream::{MarkerRecord, RingBuffer};

/// A marker found inside an extracted chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMarker {
    /// Column within the chunk (0-based)
    pub column: usize,
    pub record: MarkerRecord,
}

/// Newly arrived samples copied out of the ring buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub nbchan: usize,

    /// Absolute stream index of the first column
    pub first_sample: u64,

    /// Column-major samples, `nbchan * len()` values
    pub samples: Vec<f32>,

    /// Markers in column order
    pub markers: Vec<ChunkMarker>,

    /// Samples skipped because the backlog exceeded the buffer capacity
    pub dropped: u64,
}

impl Chunk {
    /// Number of sample columns
    pub fn len(&self) -> usize {
        if self.nbchan == 0 {
            0
        } else {
            self.samples.len() / self.nbchan
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Absolute stream index of the last column
    pub fn last_sample(&self) -> u64 {
        self.first_sample + self.len() as u64 - 1
    }
}

/// Extract everything newer than `cursor`
///
/// `cursor` is the absolute index of the last sample already consumed. At
/// most `buffer_len` columns are returned; anything older has been
/// overwritten and is reported through [`Chunk::dropped`].
pub fn extract_chunk(buffer: &RingBuffer, cursor: u64) -> Option<Chunk> {
    let smax = buffer.smax();
    if smax <= cursor || buffer.nbchan() == 0 {
        return None;
    }

    let backlog = smax - cursor;
    let n = backlog.min(buffer.buffer_len() as u64);
    let dropped = backlog - n;
    let first_sample = smax - n + 1;

    let nbchan = buffer.nbchan();
    let mut samples = Vec::with_capacity(nbchan * n as usize);
    let mut markers = Vec::new();

    for (column, index) in (first_sample..=smax).enumerate() {
        let slot = buffer.slot_of(index);
        samples.extend_from_slice(buffer.column(slot));

        for &id in buffer.marker_column(slot) {
            if id == 0 {
                continue;
            }
            match buffer.marker(id) {
                Some(record) => markers.push(ChunkMarker {
                    column,
                    record: record.clone(),
                }),
                None => tracing::warn!("Marker id {} at sample {} has no record", id, index),
            }
        }
    }

    Some(Chunk {
        nbchan,
        first_sample,
        samples,
        markers,
        dropped,
    })
}
