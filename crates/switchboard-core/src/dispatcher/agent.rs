use super::shapes::{required_text, session_or_new, Shapes, MULTI_TURN, SINGLE_TURN};
use super::{PayloadBuilder, Route, VariantCall};
use crate::error::DispatchError;
use crate::shared::{BackendVariant, RequestEnvelope};
use serde_json::{json, Value};

/// Agent-orchestration service, reached through the agent-chat route.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentBuilder;

impl AgentBuilder {
    fn payload(&self, text: &str, session_id: Option<&str>, conversation_type: &str) -> Value {
        json!({
            "query": text,
            "sessionId": session_id,
            "backendMode": self.variant().wire_name(),
            "conversationType": conversation_type,
        })
    }
}

impl PayloadBuilder for AgentBuilder {
    fn variant(&self) -> BackendVariant {
        BackendVariant::Agent
    }

    /// Single-turn even though the agent could hold memory: `sessionId` is sent as null.
    fn answer(&self, _shapes: &Shapes, env: &RequestEnvelope) -> Result<VariantCall, DispatchError> {
        let text = required_text(env, "query")?;
        Ok(VariantCall::stateless(Route::AgentChat, self.payload(text, None, SINGLE_TURN)))
    }

    fn chat(&self, _shapes: &Shapes, env: &RequestEnvelope) -> Result<VariantCall, DispatchError> {
        let text = required_text(env, "message")?;
        let session_id = session_or_new(env);
        Ok(VariantCall {
            route: Route::AgentChat,
            payload: self.payload(text, Some(&session_id), MULTI_TURN),
            session_id: Some(session_id),
        })
    }
}
