//! Error types and handling
//!
//! Common error types used across the recorder.

use crate::dataset::file::DatasetError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Recorder-wide error type
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Recording has already been finalized")]
    AlreadyFinalized,

    #[error("Recorder task failed: {0}")]
    TaskFailed(String),
}

/// Machine-readable error report
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<RecorderError> for ErrorResponse {
    fn from(error: RecorderError) -> Self {
        let code = match &error {
            RecorderError::Configuration(_) => "CONFIGURATION_ERROR",
            RecorderError::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
            RecorderError::Io(_) => "IO_ERROR",
            RecorderError::Serialization(_) => "SERIALIZATION_ERROR",
            RecorderError::Dataset(_) => "DATASET_ERROR",
            RecorderError::AlreadyFinalized => "ALREADY_FINALIZED",
            RecorderError::TaskFailed(_) => "TASK_FAILED",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;
