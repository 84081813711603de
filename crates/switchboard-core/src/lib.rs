//! switchboard-core: translate one logical action into the right downstream call for the
//! selected backend variant, normalize what comes back, and keep conversational state
//! (session ids) and credentials consistent across turns.
//!
//! The crate is transport-free: HTTP lives in `switchboard-client`, the HTTP surface in
//! `switchboard-gateway`. Everything here is pure given its inputs, except the stores,
//! which sit behind the [`KvPort`] trait.

mod config;
mod credentials;
mod dispatcher;
mod error;
mod normalizer;
mod session;
mod shared;
mod store;

pub use config::{AuthConfig, CoreConfig, DownstreamConfig, RouteTable, SearchSettings};
pub use credentials::{token_expiry_ms, CredentialKind, CredentialPair, CredentialStore};
pub use dispatcher::{
    AgentBuilder, BuiltRequest, DirectBuilder, Dispatcher, Downstream, GatewayBuilder, PayloadBuilder, Route, Shapes,
    VariantCall, FACET_FIELDS,
};
pub use error::{DispatchError, DownstreamError, NormalizeError, StoreError};
pub use normalizer::{normalize, FALLBACK_TEXT, INFERRED_CITATION_LIMIT};
pub use session::{ConversationSession, SessionRegistry, SessionTicket};
pub use shared::{
    now_ms, ApiRequest, BackendVariant, Citation, CitationOrigin, FacetSelections, LogicalAction, RequestEnvelope,
    ResponseEnvelope,
};
pub use store::{KvPort, MemoryKv, SledKv};
