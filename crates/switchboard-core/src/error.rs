//! Error taxonomy shared by the dispatcher, normalizer, stores and downstream seam.

use thiserror::Error;

/// Rejections raised before any downstream call is made.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("invalid backendMode '{value}'; expected one of: {allowed}")]
    InvalidVariant { value: String, allowed: String },

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

impl DispatchError {
    /// Name of the offending request field, for structured 400 bodies.
    pub fn field(&self) -> &'static str {
        match self {
            DispatchError::InvalidVariant { .. } => "backendMode",
            DispatchError::MissingField { field } => field,
        }
    }
}

/// A response that could not be turned into a `ResponseEnvelope`.
///
/// A missing text field is not an error; only a forwarded wrapper that itself reports
/// a failure status ends up here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("downstream reported status {status}: {message}")]
    WrappedFailure { status: u16, message: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),

    #[error("stored value under '{key}' is corrupt: {message}")]
    Corrupt { key: String, message: String },
}

/// Failure of a call to the downstream gateway (or to the boundary, seen from the client).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DownstreamError {
    #[error("credential rejected ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("downstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("downstream call timed out after {after_secs}s")]
    Timeout { after_secs: u64 },

    #[error("downstream unreachable: {0}")]
    Transport(String),

    #[error("downstream response could not be decoded: {0}")]
    Decode(String),
}

impl DownstreamError {
    /// Transient failures worth another attempt for idempotent actions.
    pub fn is_retryable(&self) -> bool {
        match self {
            DownstreamError::Timeout { .. } | DownstreamError::Transport(_) => true,
            DownstreamError::Status { status, .. } => *status >= 500 || *status == 429,
            DownstreamError::Unauthorized { .. } | DownstreamError::Decode(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            DownstreamError::Unauthorized { status, .. } | DownstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<NormalizeError> for DownstreamError {
    fn from(e: NormalizeError) -> Self {
        match e {
            NormalizeError::WrappedFailure { status, message } if status == 401 || status == 403 => {
                DownstreamError::Unauthorized { status, message }
            }
            NormalizeError::WrappedFailure { status, message } => DownstreamError::Status { status, message },
        }
    }
}
