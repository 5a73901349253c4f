use std::io;

use edgesplit_types::EdgeSplitError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("structural error: {0}")]
    Structural(String),

    #[error("decomposition mismatch at boundary {boundary}: {detail}")]
    Decomposition { boundary: usize, detail: String },

    #[error("boundary {boundary} out of range (sequence has {len} stages)")]
    BoundaryOutOfRange { boundary: usize, len: usize },

    #[error("boundary {0} is not a profiled split point")]
    UnknownBoundary(usize),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Types(#[from] EdgeSplitError),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
