//! Error types for proxy synthesis.

/// Failure of a synthesis request. No bytes are produced when one is returned.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SynthError {
    /// A descriptor or pool is too large for the container format.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A method signature uses a type the encoder cannot handle.
    #[error("unsupported signature for `{method}`: {reason}")]
    UnsupportedSignature { method: String, reason: String },

    /// Two methods collide, or a method cannot be overridden.
    #[error("conflict on `{method}`: {reason}")]
    Conflict { method: String, reason: String },

    /// An offset, size or instruction stream exceeds its field width.
    #[error("layout overflow: {0}")]
    LayoutOverflow(String),
}

impl SynthError {
    pub(crate) fn unsupported(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedSignature {
            method: method.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn conflict(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            method: method.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SynthError>;
