//! Shared utilities
//!
//! Error types and output path helpers.

pub mod error;
pub mod paths;

pub use error::{ErrorResponse, RecorderError, RecorderResult};
