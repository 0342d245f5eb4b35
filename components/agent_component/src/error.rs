//! Error types for the heapwatch agent

use memory_profiler::ProfilerError;
use thiserror::Error;

/// Errors that can occur in agent operations
#[derive(Error, Debug)]
pub enum HeapwatchError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Profiler construction or operation failed
    #[error("Profiler error: {0}")]
    Profiler(#[from] ProfilerError),

    /// Command name not recognised
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Result could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, HeapwatchError>;
