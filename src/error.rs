//! Error types for the detection heads.

use thiserror::Error;

/// Result alias for head operations.
pub type Result<T> = std::result::Result<T, HeadError>;

/// Errors raised while configuring or running the heads.
#[derive(Debug, Error)]
pub enum HeadError {
    /// A configuration value is out of range or inconsistent.
    #[error("invalid config: {0}")]
    Config(String),
    /// Top-k asked for more candidates than exist, or for none.
    #[error("top-k of {k} requested over {available} candidates")]
    TopK { k: usize, available: usize },
    /// A tensor did not have the shape the head expects.
    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    Shape {
        what: &'static str,
        expected: String,
        actual: String,
    },
    /// Loading or applying a weight file failed.
    #[error("weights: {0}")]
    Weights(String),
    /// Reading tensor data back to the host failed.
    #[error("tensor data: {0}")]
    Data(String),
}

impl HeadError {
    pub(crate) fn shape(what: &'static str, expected: impl ToString, actual: impl ToString) -> Self {
        Self::Shape {
            what,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
