//! Shared types used across the switchboard crates.

use crate::error::DispatchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Milliseconds since the Unix epoch (0 if the clock is before the epoch).
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// The three downstream architectures a logical action can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendVariant {
    /// Direct search/answer/passages service.
    #[serde(rename = "coveo")]
    Direct,
    /// Agent-orchestration service.
    #[serde(rename = "bedrockAgent")]
    Agent,
    /// Tool-orchestration gateway.
    #[serde(rename = "coveoMCP")]
    Gateway,
}

impl BackendVariant {
    pub const ALL: [BackendVariant; 3] = [BackendVariant::Direct, BackendVariant::Agent, BackendVariant::Gateway];

    /// Value carried in `backendMode`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            BackendVariant::Direct => "coveo",
            BackendVariant::Agent => "bedrockAgent",
            BackendVariant::Gateway => "coveoMCP",
        }
    }

    /// Comma-separated legal wire values, for validation messages.
    pub fn legal_values() -> String {
        Self::ALL.iter().map(|v| v.wire_name()).collect::<Vec<_>>().join(", ")
    }

    /// Resolves an optional raw `backendMode`; absent or blank means Direct.
    pub fn resolve(raw: Option<&str>) -> Result<Self, DispatchError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(BackendVariant::Direct),
            Some(s) => s.parse(),
        }
    }

    /// Whether an id minted under this variant survives a process restart.
    /// Only the gateway keeps conversational memory keyed by a reloaded page.
    pub fn persists_session(&self) -> bool {
        matches!(self, BackendVariant::Gateway)
    }
}

impl FromStr for BackendVariant {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.wire_name() == s)
            .ok_or_else(|| DispatchError::InvalidVariant {
                value: s.to_string(),
                allowed: Self::legal_values(),
            })
    }
}

impl fmt::Display for BackendVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A user-facing operation, independent of the variant it is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalAction {
    Search,
    Passages,
    Answer,
    Chat,
    Suggest,
    Content,
}

impl LogicalAction {
    pub const ALL: [LogicalAction; 6] = [
        LogicalAction::Search,
        LogicalAction::Passages,
        LogicalAction::Answer,
        LogicalAction::Chat,
        LogicalAction::Suggest,
        LogicalAction::Content,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LogicalAction::Search => "search",
            LogicalAction::Passages => "passages",
            LogicalAction::Answer => "answer",
            LogicalAction::Chat => "chat",
            LogicalAction::Suggest => "suggest",
            LogicalAction::Content => "content",
        }
    }

    /// Only Chat owns multi-turn state.
    pub fn is_multi_turn(&self) -> bool {
        matches!(self, LogicalAction::Chat)
    }

    /// Safe to repeat on transient failure; none of these touch a session.
    pub fn is_idempotent(&self) -> bool {
        matches!(self, LogicalAction::Search | LogicalAction::Passages | LogicalAction::Suggest)
    }

    /// Path segment of the boundary route (`/api/{segment}`).
    pub fn boundary_path(&self) -> &'static str {
        match self {
            LogicalAction::Content => "html",
            other => other.name(),
        }
    }
}

impl fmt::Display for LogicalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Selected facet values keyed by facet field (e.g. `"project" -> ["alpha"]`).
pub type FacetSelections = BTreeMap<String, Vec<String>>;

/// Everything the UI layer knows about one action; consumed by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestEnvelope {
    /// Query (search-like actions) or message (chat).
    pub text: String,
    /// Raw `backendMode`; parsed by the dispatcher so unknown values can be reported.
    pub backend_mode: Option<String>,
    pub facets: FacetSelections,
    pub session_id: Option<String>,
    pub first_result: u32,
    pub number_of_results: Option<u32>,
    pub number_of_passages: Option<u32>,
    /// Stable per-document identifier (content previews).
    pub unique_id: Option<String>,
    pub requested_output_size: Option<u32>,
    pub suggest_count: Option<u32>,
    /// Authenticated actor, forwarded where the downstream keys memory by user.
    pub actor: Option<String>,
}

impl RequestEnvelope {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_variant(mut self, variant: BackendVariant) -> Self {
        self.backend_mode = Some(variant.wire_name().to_string());
        self
    }

    pub fn with_backend_mode(mut self, raw: impl Into<String>) -> Self {
        self.backend_mode = Some(raw.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_facet(mut self, field: impl Into<String>, values: Vec<String>) -> Self {
        self.facets.insert(field.into(), values);
        self
    }

    pub fn with_page(mut self, first_result: u32, number_of_results: u32) -> Self {
        self.first_result = first_result;
        self.number_of_results = Some(number_of_results);
        self
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Session id if present and non-blank.
    pub fn session(&self) -> Option<&str> {
        self.session_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// JSON body accepted by the boundary's `/api/*` routes.
///
/// One shape serves every route: search-like routes read `query`, chat reads `message`,
/// suggest also accepts `q`. Unused fields are skipped on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_mode: Option<String>,
    #[serde(default, skip_serializing_if = "FacetSelections::is_empty")]
    pub facets: FacetSelections,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_results: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_result: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_passages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_output_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ApiRequest {
    /// Body the client sends to `/api/{action}` for this envelope.
    pub fn from_envelope(action: LogicalAction, env: &RequestEnvelope) -> Self {
        let mut req = ApiRequest {
            backend_mode: env.backend_mode.clone(),
            user_id: env.actor.clone(),
            ..Self::default()
        };
        match action {
            LogicalAction::Chat => {
                req.message = Some(env.text.clone());
                req.session_id = env.session_id.clone();
            }
            LogicalAction::Suggest => {
                req.q = Some(env.text.clone());
                req.count = env.suggest_count;
            }
            LogicalAction::Content => {
                req.q = Some(env.text.clone());
                req.unique_id = env.unique_id.clone();
                req.requested_output_size = env.requested_output_size;
            }
            LogicalAction::Search => {
                req.query = Some(env.text.clone());
                req.facets = env.facets.clone();
                req.number_of_results = env.number_of_results;
                req.first_result = Some(env.first_result);
            }
            LogicalAction::Passages => {
                req.query = Some(env.text.clone());
                req.facets = env.facets.clone();
                req.number_of_passages = env.number_of_passages;
            }
            LogicalAction::Answer => {
                req.query = Some(env.text.clone());
                req.facets = env.facets.clone();
                req.session_id = env.session_id.clone();
            }
        }
        req
    }

    /// Envelope the dispatcher consumes. Text comes from `message`, `query` or `q`,
    /// in that order of preference for chat and the reverse preference otherwise.
    pub fn into_envelope(self, action: LogicalAction) -> RequestEnvelope {
        let text = if action.is_multi_turn() {
            self.message.or(self.query).or(self.q)
        } else {
            self.query.or(self.q).or(self.message)
        };
        RequestEnvelope {
            text: text.unwrap_or_default(),
            backend_mode: self.backend_mode,
            facets: self.facets,
            session_id: self.session_id,
            first_result: self.first_result.unwrap_or(0),
            number_of_results: self.number_of_results,
            number_of_passages: self.number_of_passages,
            unique_id: self.unique_id,
            requested_output_size: self.requested_output_size,
            suggest_count: self.count,
            actor: self.user_id,
        }
    }
}

/// Where a citation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationOrigin {
    /// Returned by the downstream as a citation.
    Downstream,
    /// Best-effort: lifted from the top search results because no citations were returned.
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub title: String,
    pub uri: String,
    pub source_tag: String,
    pub origin: CitationOrigin,
}

/// Canonical response handed back to the UI, whatever the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    /// Always present; holds the fallback marker when no text was recognised.
    pub text: String,
    /// True when `text` is the fallback marker.
    #[serde(default)]
    pub fallback: bool,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_list: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<serde_json::Value>,
}

impl ResponseEnvelope {
    /// Citations returned by the downstream itself (excludes inferred ones).
    pub fn authoritative_citations(&self) -> impl Iterator<Item = &Citation> {
        self.citations.iter().filter(|c| c.origin == CitationOrigin::Downstream)
    }
}
