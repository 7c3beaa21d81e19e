//! Error types for StreamForge

use thiserror::Error;

/// Core error type
///
/// Construction errors surface immediately from `add_stage`/builders.
/// Runtime errors inside stages are classified: recoverable divergence is
/// logged and the stage resets itself, fatal errors surface from `process`.
#[derive(Error, Debug)]
pub enum SfError {
    #[error("Invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("Channel mismatch: expected {expected}, got {got}")]
    ChannelMismatch { expected: usize, got: usize },

    #[error("State format mismatch at `{field}`: {reason}")]
    StateFormatMismatch { field: String, reason: String },

    #[error("Numerical divergence in stage `{stage}`: {detail}")]
    NumericalDivergence { stage: String, detail: String },

    #[error("Callback failure under `{topic}`: {detail}")]
    CallbackFailure { topic: String, detail: String },

    #[error("Kernel failure: {0}")]
    KernelFailure(String),
}

impl SfError {
    /// Shorthand for a construction-time parameter rejection
    pub fn invalid_param(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a checkpoint format rejection
    pub fn state_mismatch(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StateFormatMismatch {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type SfResult<T> = Result<T, SfError>;
