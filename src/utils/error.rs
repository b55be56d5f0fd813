//! Error Handling Module
//!
//! Defines the error taxonomy for the LeafBot inference core.
//! Uses thiserror for ergonomic error definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for LeafBot inference operations
#[derive(Error, Debug)]
pub enum LeafbotError {
    /// Checkpoint path unset or otherwise misconfigured
    #[error("Configuration error: {0}")]
    Config(String),

    /// Checkpoint missing, corrupt, or inconsistent with its class list
    #[error("Failed to load model from '{}': {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    /// Input bytes are not a decodable image
    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    /// Unexpected failure during the forward pass
    #[error("Prediction failed: {0}")]
    Prediction(String),
}

/// Convenience Result type for LeafBot operations
pub type Result<T> = std::result::Result<T, LeafbotError>;

/// Coarse error category handed to callers (e.g. an HTTP layer mapping to status codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ConfigError,
    ModelLoadError,
    ImageDecodeError,
    PredictionError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::ModelLoadError => "ModelLoadError",
            ErrorKind::ImageDecodeError => "ImageDecodeError",
            ErrorKind::PredictionError => "PredictionError",
        };
        f.write_str(name)
    }
}

/// Structured `{kind, message}` form of an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl LeafbotError {
    /// Build a model load error for the given checkpoint path
    pub fn model_load(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        LeafbotError::ModelLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LeafbotError::Config(_) => ErrorKind::ConfigError,
            LeafbotError::ModelLoad { .. } => ErrorKind::ModelLoadError,
            LeafbotError::ImageDecode(_) => ErrorKind::ImageDecodeError,
            LeafbotError::Prediction(_) => ErrorKind::PredictionError,
        }
    }

    /// Whether a later call may succeed without operator action on the request.
    ///
    /// A failed checkpoint load leaves the cache slot empty, so the next call
    /// retries it. Configuration errors stay fatal until corrected, and
    /// decode/prediction errors are tied to the request that produced them.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LeafbotError::ModelLoad { .. })
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<image::ImageError> for LeafbotError {
    fn from(err: image::ImageError) -> Self {
        LeafbotError::ImageDecode(err.to_string())
    }
}
