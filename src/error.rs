//! Error types for the observation engine.

use thiserror::Error;

/// Main error type for observation and attribute operations.
#[derive(Debug, Error)]
pub enum ObserveError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    #[error("Invalid change event: {0}")]
    InvalidEvent(String),

    #[error("Invalid receiver: {0}")]
    InvalidReceiver(String),

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Cannot redefine attribute: {0}")]
    CannotRedefine(String),

    #[error("Record is not extensible, cannot add attribute: {0}")]
    NotExtensible(String),

    #[error("Invalid sequence length: {0}")]
    InvalidLength(String),
}

/// Result type for observation operations.
pub type Result<T> = std::result::Result<T, ObserveError>;
