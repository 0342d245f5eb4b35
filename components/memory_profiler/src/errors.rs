//! Error types for the memory profiler

use thiserror::Error;

/// Failure reported by one of the host facilities
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Process statistics could not be read
    #[error("process memory unavailable: {0}")]
    ProcessUnavailable(String),

    /// A snapshot was requested while the allocation tracer is stopped
    #[error("the allocation tracer is not tracing")]
    TracerNotStarted,

    /// The tracer could not produce a snapshot
    #[error("allocation snapshot failed: {0}")]
    SnapshotFailed(String),

    /// The reclamation subsystem could not complete a pass
    #[error("forced reclamation failed: {0}")]
    ReclaimFailed(String),
}

/// Errors that abort profiler construction or escape a profiler call
#[derive(Error, Debug)]
pub enum ProfilerError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Result type for profiler operations
pub type Result<T> = std::result::Result<T, ProfilerError>;
