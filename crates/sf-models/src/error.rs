//! Error types for model loading and inference

use thiserror::Error;

/// Model repository and inference errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model not found: {0}")]
    NotFound(String),

    #[error("failed to load model {name}: {reason}")]
    LoadFailed { name: String, reason: String },

    #[error("invalid model metadata for {name}: {reason}")]
    InvalidMetadata { name: String, reason: String },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;
