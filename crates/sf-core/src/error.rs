//! Error types for the separation core

use thiserror::Error;

/// Separation core error types
#[derive(Error, Debug)]
pub enum SepError {
    /// Invalid configuration (bad overlap, segment length, audio shape)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Model forward pass failed
    #[error("Model error: {0}")]
    Model(String),

    /// Model returned a tensor of the wrong shape
    #[error("Invalid model output shape: expected {expected}, got {got}")]
    InvalidOutputShape { expected: String, got: String },

    /// The progress callback requested an abort. Not a failure: `apply_model`
    /// and `separate` convert this into a `Cancelled` outcome.
    #[error("Separation cancelled")]
    Cancelled,

    /// Internal consistency error (windowing bug, not user-recoverable)
    #[error("Internal consistency error: {0}")]
    Internal(String),
}

/// Result type for separation operations
pub type SepResult<T> = Result<T, SepError>;
