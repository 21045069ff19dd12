//! Worker error types.
//!
//! Per-item failures never surface here; they become skip records. Only
//! conditions that end the whole run are represented.

use thiserror::Error;

use splicer_media::MediaError;
use splicer_models::ConfigError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("No inputs survived probing and normalization")]
    NoSurvivingInputs,

    #[error("No video files found in inputs")]
    NoVideoInputs,

    #[error("Final concatenation failed: {0}")]
    ConcatFailed(#[source] MediaError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Manifest output was already recorded")]
    ManifestSealed,

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<ConfigError> for WorkerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
