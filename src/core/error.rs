//! Error types for volume commits

use thiserror::Error;

/// Main error type for the crate
///
/// All variants are raised synchronously from a commit boundary. A failed
/// commit leaves any previously committed structure untouched.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing, mismatched or out-of-range parameter
    #[error("validation error: {0}")]
    Validation(String),

    /// Input does not fit the acceleration structure
    #[error("structural error: {0}")]
    Structural(String),

    /// The BVH builder rejected its input
    #[error("BVH build failure: {0}")]
    BuildFailure(String),

    /// Operation requires a successfully committed volume
    #[error("volume has not been committed")]
    NotCommitted,

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        Error::Structural(msg.into())
    }
}
