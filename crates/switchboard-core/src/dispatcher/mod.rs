//! Dispatcher: turns a logical action plus a backend variant into one downstream call.
//!
//! Search, Passages, Suggest and Content share a single shape across variants and only carry
//! the variant as a `backendMode` tag. Answer and Chat are structurally different per variant;
//! each variant implements [`PayloadBuilder`] for them.

mod agent;
mod direct;
mod gateway;
mod shapes;

pub use agent::AgentBuilder;
pub use direct::DirectBuilder;
pub use gateway::GatewayBuilder;
pub use shapes::{Shapes, FACET_FIELDS};

use crate::config::{RouteTable, SearchSettings};
use crate::error::{DispatchError, DownstreamError};
use crate::shared::{BackendVariant, LogicalAction, RequestEnvelope};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Downstream route a built request targets. Paths come from [`RouteTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Search,
    Passages,
    Answer,
    AgentChat,
    Gateway,
    Suggest,
    Content,
}

impl Route {
    pub fn name(&self) -> &'static str {
        match self {
            Route::Search => "search",
            Route::Passages => "passages",
            Route::Answer => "answer",
            Route::AgentChat => "agent_chat",
            Route::Gateway => "gateway",
            Route::Suggest => "suggest",
            Route::Content => "content",
        }
    }

    pub fn path<'a>(&self, routes: &'a RouteTable) -> &'a str {
        match self {
            Route::Search => &routes.search,
            Route::Passages => &routes.passages,
            Route::Answer => &routes.answer,
            Route::AgentChat => &routes.agent_chat,
            Route::Gateway => &routes.gateway,
            Route::Suggest => &routes.suggest,
            Route::Content => &routes.content,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Route, payload and session id produced by a builder for one action.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantCall {
    pub route: Route,
    pub payload: Value,
    /// Session id of the turn; may be set even when the payload does not carry it.
    pub session_id: Option<String>,
}

impl VariantCall {
    pub fn stateless(route: Route, payload: Value) -> Self {
        Self {
            route,
            payload,
            session_id: None,
        }
    }
}

/// A fully built downstream call.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltRequest {
    pub action: LogicalAction,
    /// `None` when a variant-agnostic action carried an unrecognised `backendMode`.
    pub variant: Option<BackendVariant>,
    /// Value sent as `backendMode`.
    pub variant_tag: String,
    pub route: Route,
    pub payload: Value,
    /// Session id belonging to this turn (multi-turn actions, and gateway answers).
    pub session_id: Option<String>,
}

/// One implementation per backend variant.
///
/// `build` covers every action; the shared shapes are provided and only the conversational
/// actions differ per variant.
pub trait PayloadBuilder: Send + Sync {
    fn variant(&self) -> BackendVariant;

    fn answer(&self, shapes: &Shapes, env: &RequestEnvelope) -> Result<VariantCall, DispatchError>;

    fn chat(&self, shapes: &Shapes, env: &RequestEnvelope) -> Result<VariantCall, DispatchError>;

    fn build(
        &self,
        action: LogicalAction,
        shapes: &Shapes,
        env: &RequestEnvelope,
        tag: &str,
    ) -> Result<VariantCall, DispatchError> {
        match action {
            LogicalAction::Search => Ok(VariantCall::stateless(Route::Search, shapes.search(env, tag))),
            LogicalAction::Passages => Ok(VariantCall::stateless(Route::Passages, shapes.passages(env, tag))),
            LogicalAction::Suggest => Ok(VariantCall::stateless(Route::Suggest, shapes.suggest(env, tag))),
            LogicalAction::Content => Ok(VariantCall::stateless(Route::Content, shapes.content(env)?)),
            LogicalAction::Answer => self.answer(shapes, env),
            LogicalAction::Chat => self.chat(shapes, env),
        }
    }
}

/// Seam to the downstream gateway. The bearer is attached verbatim when present.
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn call(&self, request: &BuiltRequest, bearer: Option<&str>) -> Result<Value, DownstreamError>;
}

/// Selects the builder for a request's variant and produces the downstream call.
pub struct Dispatcher {
    shapes: Shapes,
    builders: Vec<Box<dyn PayloadBuilder>>,
}

impl Dispatcher {
    pub fn new(settings: SearchSettings) -> Self {
        Self {
            shapes: Shapes::new(settings),
            builders: vec![Box::new(DirectBuilder), Box::new(AgentBuilder), Box::new(GatewayBuilder)],
        }
    }

    pub fn settings(&self) -> &SearchSettings {
        self.shapes.settings()
    }

    fn builder(&self, variant: BackendVariant) -> &dyn PayloadBuilder {
        self.builders
            .iter()
            .find(|b| b.variant() == variant)
            .map(|b| b.as_ref())
            .unwrap_or(&DirectBuilder as &dyn PayloadBuilder)
    }

    /// Pure: validation errors are raised here, before anything touches the network.
    pub fn build_request(&self, action: LogicalAction, env: &RequestEnvelope) -> Result<BuiltRequest, DispatchError> {
        let raw = env.backend_mode.as_deref();
        let (variant, tag) = match action {
            LogicalAction::Answer | LogicalAction::Chat => {
                let v = BackendVariant::resolve(raw)?;
                (Some(v), v.wire_name().to_string())
            }
            _ => match BackendVariant::resolve(raw) {
                Ok(v) => (Some(v), v.wire_name().to_string()),
                Err(_) => {
                    let tag = raw.map(str::trim).unwrap_or_default().to_string();
                    tracing::debug!(target: "switchboard::dispatch", action = %action, tag = %tag, "unrecognised backendMode carried as tag");
                    (None, tag)
                }
            },
        };

        let builder = self.builder(variant.unwrap_or(BackendVariant::Direct));
        let call = builder.build(action, &self.shapes, env, &tag)?;
        tracing::debug!(
            target: "switchboard::dispatch",
            action = %action,
            variant = %tag,
            route = %call.route,
            has_session = call.session_id.is_some(),
            "built downstream request"
        );
        Ok(BuiltRequest {
            action,
            variant,
            variant_tag: tag,
            route: call.route,
            payload: call.payload,
            session_id: call.session_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(SearchSettings::default())
    }

    fn chat(variant: BackendVariant) -> RequestEnvelope {
        RequestEnvelope::new("hi").with_variant(variant)
    }

    #[test]
    fn chat_generates_then_reuses_session_for_every_variant() {
        let d = dispatcher();
        for v in BackendVariant::ALL {
            let first = d.build_request(LogicalAction::Chat, &chat(v)).unwrap();
            let id = first.session_id.clone().unwrap();
            assert!(!id.is_empty());

            let second = d.build_request(LogicalAction::Chat, &chat(v).with_session(&id)).unwrap();
            assert_eq!(second.session_id.as_deref(), Some(id.as_str()));
            if v != BackendVariant::Direct {
                assert_eq!(second.payload["sessionId"], json!(id));
                assert_eq!(second.payload["conversationType"], "multi-turn");
            }
        }
    }

    #[test]
    fn invalid_variant_for_answer_lists_legal_values() {
        let env = RequestEnvelope::new("q").with_backend_mode("unknown");
        let err = dispatcher().build_request(LogicalAction::Answer, &env).unwrap_err();
        assert_eq!(
            err,
            DispatchError::InvalidVariant {
                value: "unknown".into(),
                allowed: "coveo, bedrockAgent, coveoMCP".into()
            }
        );
        assert!(dispatcher().build_request(LogicalAction::Chat, &env).is_err());
    }

    #[test]
    fn unknown_variant_on_search_is_carried_as_tag() {
        let env = RequestEnvelope::new("q").with_backend_mode("experimental");
        let built = dispatcher().build_request(LogicalAction::Search, &env).unwrap();
        assert_eq!(built.variant, None);
        assert_eq!(built.payload["backendMode"], "experimental");
    }

    #[test]
    fn absent_variant_defaults_to_direct() {
        let built = dispatcher().build_request(LogicalAction::Answer, &RequestEnvelope::new("q")).unwrap();
        assert_eq!(built.variant, Some(BackendVariant::Direct));
        assert_eq!(built.route, Route::Answer);
    }

    #[test]
    fn scenario_direct_chat_sends_no_session() {
        let built = dispatcher().build_request(LogicalAction::Chat, &chat(BackendVariant::Direct)).unwrap();
        assert_eq!(built.route, Route::Answer);
        assert!(built.payload.get("sessionId").is_none());
        assert!(built.payload.get("conversationType").is_none());
    }

    #[test]
    fn scenario_gateway_chat_with_null_session_generates_uuid() {
        let env = RequestEnvelope {
            session_id: None,
            ..chat(BackendVariant::Gateway)
        };
        let built = dispatcher().build_request(LogicalAction::Chat, &env).unwrap();
        assert_eq!(built.route, Route::Gateway);
        let id = built.payload["sessionId"].as_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(built.payload["conversationType"], "multi-turn");
    }

    #[test]
    fn scenario_search_pages_differ_only_in_offset() {
        let d = dispatcher();
        let a = d
            .build_request(LogicalAction::Search, &RequestEnvelope::new("lambda").with_variant(BackendVariant::Agent).with_page(0, 20))
            .unwrap();
        let b = d
            .build_request(LogicalAction::Search, &RequestEnvelope::new("lambda").with_variant(BackendVariant::Agent).with_page(20, 20))
            .unwrap();
        assert_eq!(a.route, b.route);
        let (mut pa, mut pb) = (a.payload.clone(), b.payload.clone());
        assert_eq!(pa["firstResult"], 0);
        assert_eq!(pb["firstResult"], 20);
        pa.as_object_mut().unwrap().remove("firstResult");
        pb.as_object_mut().unwrap().remove("firstResult");
        assert_eq!(pa, pb);
    }

    #[test]
    fn search_shape_is_variant_independent() {
        let d = dispatcher();
        let payloads: Vec<Value> = BackendVariant::ALL
            .into_iter()
            .map(|v| {
                let mut p = d
                    .build_request(LogicalAction::Search, &RequestEnvelope::new("q").with_variant(v))
                    .unwrap()
                    .payload;
                p.as_object_mut().unwrap().remove("backendMode");
                p
            })
            .collect();
        assert!(payloads.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn blank_chat_message_is_rejected() {
        let err = dispatcher()
            .build_request(LogicalAction::Chat, &RequestEnvelope::new("   ").with_variant(BackendVariant::Agent))
            .unwrap_err();
        assert_eq!(err.field(), "message");
    }

    #[test]
    fn content_without_identifier_fails_before_routing() {
        let err = dispatcher()
            .build_request(LogicalAction::Content, &RequestEnvelope::new("q"))
            .unwrap_err();
        assert_eq!(err.field(), "uniqueId");
    }

    #[test]
    fn routes_resolve_to_configured_paths() {
        let routes = RouteTable::default();
        assert_eq!(Route::AgentChat.path(&routes), "bedrock-agent-chat");
        assert_eq!(Route::Gateway.path(&routes), "agentcore");
        assert_eq!(Route::Content.path(&routes), "html");
    }
}
