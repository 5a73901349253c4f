use std::io;
use std::path::PathBuf;

use edgesplit_types::EdgeSplitError;

/// Crate-local error type for `edgesplit-telemetry` operations.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("shared segment {key} at {path}: {source}")]
    Segment {
        key: u32,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("segment {key} is {actual} bytes, need at least {required}")]
    SegmentTooSmall { key: u32, actual: usize, required: usize },

    #[error("network interface '{0}' not found")]
    UnknownInterface(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] EdgeSplitError),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, TelemetryError>;
