use switchboard_core::{DispatchError, DownstreamError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Rejected locally before any network call.
    #[error(transparent)]
    Invalid(#[from] DispatchError),

    /// Transport failure, rejected credential, or a failure reported inside the reply.
    #[error(transparent)]
    Downstream(#[from] DownstreamError),

    #[error("client state: {0}")]
    Store(#[from] StoreError),
}

impl ClientError {
    /// True when the caller must authenticate again.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Downstream(DownstreamError::Unauthorized { .. }))
    }
}
