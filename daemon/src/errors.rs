/// Error types for the Quill daemon
use quill_core::{ConfigError, IndexError, JobQueueError, StoreError};
use thiserror::Error;

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Daemon error types
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Storage backend could not be opened or initialised
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Job queue error: {0}")]
    JobQueue(#[from] JobQueueError),

    #[error("Index queue error: {0}")]
    Index(#[from] IndexError),

    /// Logging could not be initialised
    #[error("Logging error: {0}")]
    Logging(String),
}
