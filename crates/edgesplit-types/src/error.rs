// Top-level error type shared by every EdgeSplit crate.

#[derive(Debug, thiserror::Error)]
pub enum EdgeSplitError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("tensor error: {0}")]
    Tensor(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}
