//! Error types shared across hexworld crates.

use thiserror::Error;

use crate::coords::ChunkCoord;

/// Top-level error type for hexworld operations.
#[derive(Debug, Error)]
pub enum HexworldError {
    /// Chunk persistence errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Generation or meshing job errors
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A world id that is not known to the catalog
    #[error("Unknown world: {0}")]
    UnknownWorld(String),
}

/// Chunk store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying IO failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded or decoded
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Record exists but its content is unusable
    #[error("Corrupted record {key}: {reason}")]
    Corrupted {
        /// Composite record key
        key: String,
        /// What was wrong
        reason: String,
    },

    /// World id cannot be used as a storage namespace
    #[error("Invalid world id: {0:?}")]
    InvalidWorldId(String),

    /// Backend refused the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by a resumable generation or meshing job.
#[derive(Debug, Error)]
pub enum JobError {
    /// A step failed
    #[error("Job for chunk {coord} failed: {reason}")]
    Failed {
        /// Chunk the job was bound to
        coord: ChunkCoord,
        /// Failure description
        reason: String,
    },

    /// The job was asked for its result before it finished
    #[error("Job for chunk {0} is not complete")]
    Incomplete(ChunkCoord),
}

/// Result type alias for hexworld operations.
pub type HexworldResult<T> = Result<T, HexworldError>;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for job steps.
pub type JobResult<T> = Result<T, JobError>;
