//! Dataset files
//!
//! Header schema, on-disk layout and the finalizer that completes a recording.

pub mod file;
pub mod finalizer;
pub mod schema;

pub use file::{read_dataset, read_header, DatasetError, DatasetPaths};
pub use finalizer::DatasetFinalizer;
pub use schema::{DatasetEvent, DatasetHeader};
