use super::shapes::{required_text, session_or_new, Shapes, MULTI_TURN, SINGLE_TURN};
use super::{PayloadBuilder, Route, VariantCall};
use crate::error::DispatchError;
use crate::shared::{BackendVariant, RequestEnvelope};
use serde_json::{json, Value};

/// Tool-orchestration gateway. Always carries a session id and the per-tool `controls`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayBuilder;

impl GatewayBuilder {
    fn call(&self, shapes: &Shapes, env: &RequestEnvelope, field: &'static str, conversation_type: &str) -> Result<VariantCall, DispatchError> {
        let text = required_text(env, field)?;
        let session_id = session_or_new(env);
        let mut payload = json!({
            "question": text,
            "sessionId": session_id,
            "backendMode": self.variant().wire_name(),
            "conversationType": conversation_type,
            "controls": shapes.gateway_controls(),
        });
        if let (Some(actor), Value::Object(m)) = (env.actor.as_deref().filter(|a| !a.is_empty()), &mut payload) {
            m.insert("userId".into(), json!(actor));
        }
        Ok(VariantCall {
            route: Route::Gateway,
            payload,
            session_id: Some(session_id),
        })
    }
}

impl PayloadBuilder for GatewayBuilder {
    fn variant(&self) -> BackendVariant {
        BackendVariant::Gateway
    }

    fn answer(&self, shapes: &Shapes, env: &RequestEnvelope) -> Result<VariantCall, DispatchError> {
        self.call(shapes, env, "query", SINGLE_TURN)
    }

    fn chat(&self, shapes: &Shapes, env: &RequestEnvelope) -> Result<VariantCall, DispatchError> {
        self.call(shapes, env, "message", MULTI_TURN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchSettings;

    #[test]
    fn answer_generates_session_and_declares_controls() {
        let shapes = Shapes::new(SearchSettings::default());
        let call = GatewayBuilder.answer(&shapes, &RequestEnvelope::new("q")).unwrap();
        assert_eq!(call.route, Route::Gateway);
        assert_eq!(call.payload["conversationType"], "single-turn");
        assert_eq!(call.payload["sessionId"].as_str(), call.session_id.as_deref());
        assert!(call.payload["controls"]["passages"]["additionalFields"].is_array());
        assert!(call.payload.get("userId").is_none());
    }

    #[test]
    fn actor_is_forwarded_as_user_id() {
        let shapes = Shapes::new(SearchSettings::default());
        let env = RequestEnvelope::new("hi").with_actor("user-42").with_session("s-1");
        let call = GatewayBuilder.chat(&shapes, &env).unwrap();
        assert_eq!(call.payload["userId"], "user-42");
        assert_eq!(call.payload["sessionId"], "s-1");
        assert_eq!(call.payload["conversationType"], "multi-turn");
    }
}
