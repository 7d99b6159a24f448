//! # Error Types
//!
//! Every fallible operation in the pipeline reports a [`PipelineError`]. Geometry problems found
//! while meshing (unknown block ids, missing models, absent neighbor chunks) are not errors: the
//! builder skips the affected face and carries on.

use thiserror::Error;

/// Main error type for the meshing pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The worker pool was asked for a thread count outside `[1, 16]`.
    #[error("invalid worker thread count {0}, expected 1..=16")]
    InvalidThreadCount(usize),

    /// The worker pool was created without a processing callback.
    #[error("worker pool requires a processing function")]
    MissingProcessFn,

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(std::io::Error),

    /// Work was submitted to a pool that has already been shut down.
    #[error("worker pool has been shut down")]
    PoolShutDown,

    /// The block-type catalog is missing entries or is malformed.
    #[error("block catalog error: {0}")]
    Catalog(String),

    /// A block type was requested by a name or id that the catalog does not know.
    #[error("unknown block type: {0}")]
    UnknownBlock(String),

    /// A custom model could not be loaded.
    #[error("model error: {0}")]
    Model(String),

    /// Chunk-local coordinates outside the chunk bounds.
    #[error("block position ({x}, {y}, {z}) is outside the chunk")]
    OutOfBounds {
        /// Local x coordinate
        x: i32,
        /// Height
        y: i32,
        /// Local z coordinate
        z: i32,
    },

    /// A persisted or network chunk buffer could not be decoded.
    #[error("chunk codec error: {0}")]
    Codec(String),

    /// A buffer could not grow to the size a rebuild needed.
    #[error("resource exhausted: {0}")]
    Resource(String),

    /// Settings failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Underlying filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON in a settings, catalog or model file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
