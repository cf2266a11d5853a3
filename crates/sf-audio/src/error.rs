//! Error types for audio I/O

use thiserror::Error;

/// Audio decode/encode errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("input file not found: {0}")]
    InputNotFound(String),

    #[error("failed to read audio file: {0}")]
    ReadError(String),

    #[error("every decode backend failed for {path}: symphonia: {symphonia}; wav: {wav}")]
    AllBackendsFailed {
        path: String,
        symphonia: String,
        wav: String,
    },

    #[error("failed to write output file: {0}")]
    WriteError(String),

    #[error("invalid output configuration: {0}")]
    ConfigError(String),

    #[error("cannot convert {from} channels to {to}")]
    ChannelConversion { from: usize, to: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
