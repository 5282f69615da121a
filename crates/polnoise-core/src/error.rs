//! Error taxonomy for the mode engine.
//!
//! Two kinds of failure matter to the engine itself: a collaborator that was
//! never bound (`InvalidState`) and a parameter that admits no valid
//! statistical model (`InvalidParameter`). Both abort the construction or
//! measurement in progress. The I/O and JSON variants only arise from
//! configuration loading and run recording.

use thiserror::Error;

/// Errors produced by `polnoise-core`.
#[derive(Debug, Error)]
pub enum Error {
    /// A required collaborator (Gaussian source, coordinator slot) was not bound.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A parameter lies outside the range for which the model exists.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub(crate) fn parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
