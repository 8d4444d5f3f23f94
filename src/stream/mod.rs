//! Live sample streams
//!
//! The ring buffer a producer writes into, the handle that shares it, and a
//! synthetic producer for running without acquisition hardware.

pub mod handle;
pub mod ring;
pub mod synthetic;

pub use handle::{StreamHandle, StreamInfo, StreamSource};
pub use ring::{MarkerRecord, PendingMarker, RingBuffer};
