//! Error handling for the quality scoring engine
//!
//! This module defines the error types that can occur while ingesting
//! samples and scoring a test run. Most conditions the engine meets are
//! handled in-band (absent tracks become `supported: false` verdicts,
//! malformed samples abort with partial results); the variants here are
//! the internal currency those paths are built from.

use thiserror::Error;

/// Result type alias for quality-core operations
pub type Result<T> = std::result::Result<T, QualityError>;

/// Error type for the scoring engine
#[derive(Error, Debug)]
pub enum QualityError {
    /// A delta-based computation was invoked with too few samples
    #[error("Insufficient samples: need at least {needed}, got {got}")]
    InsufficientSamples { needed: usize, got: usize },

    /// A sample carried a negative or otherwise impossible counter
    #[error("Malformed sample: {detail}")]
    MalformedSample { detail: String },

    /// A threshold table entry could not be used
    #[error("Invalid threshold entry: {detail}")]
    InvalidThreshold { detail: String },

    /// The test configuration failed validation
    #[error("Invalid configuration: {detail}")]
    InvalidConfig { detail: String },

    /// The sample source failed to deliver stats
    #[error("Sample source failure: {reason}")]
    SampleSource { reason: String },

    /// The test run was aborted before producing a result
    #[error("Test aborted: {reason}")]
    TestAborted { reason: String },
}

impl QualityError {
    /// Shorthand for the insufficient-samples guard used by the
    /// throughput and MOS paths.
    pub fn insufficient(needed: usize, got: usize) -> Self {
        QualityError::InsufficientSamples { needed, got }
    }
}
