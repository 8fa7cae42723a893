//! Error types for the medset crate.
//!
//! All failures in this crate are configuration or programmer errors surfaced
//! at dataset-build time or on first use; nothing is retried. Missing ground
//! truth or region-of-interest data is not an error and is represented by
//! explicit `Option` markers on the sample record instead.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by dataset construction, sample extraction and transforms.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid dataset or transform configuration (bad parameter ranges,
    /// tiling divisibility violations, channel-count disagreements).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Co-registered volumes disagree on spatial shape.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Volume dimensionality outside the supported range.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Slicing axis outside the valid `{0, 1, 2}` range.
    #[error("invalid axis {axis}, must be between 0 and 2")]
    InvalidAxis { axis: usize },

    /// A batch contained elements the collator cannot merge.
    #[error("collation error: {0}")]
    Collation(String),

    /// A transform could not be applied or inverted.
    #[error("{operation} failed: {reason}")]
    Transform { operation: String, reason: String },
}

impl Error {
    /// Build a [`Error::Transform`] from an operation name and a reason.
    pub(crate) fn transform(operation: &str, reason: impl Into<String>) -> Self {
        Self::Transform {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}
