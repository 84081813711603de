//! switchboard-client: HTTP plumbing around `switchboard-core`.
//!
//! - [`Transport`]: reqwest with a fixed timeout and bounded, jittered retry.
//! - [`HttpDownstream`]: the boundary's [`switchboard_core::Downstream`] over HTTP.
//! - [`SearchClient`]: the caller side of the boundary; owns credential selection,
//!   re-authentication signalling, concurrent fan-out and sequential chat turns.

mod client;
mod downstream;
mod error;
mod retry;
mod transport;

pub use client::{AuthSignal, ReauthReason, SearchAll, SearchClient, DEFAULT_EXPIRY_CHECK};
pub use downstream::HttpDownstream;
pub use error::ClientError;
pub use retry::RetryPolicy;
pub use transport::Transport;
