use super::shapes::{required_text, session_or_new, Shapes};
use super::{PayloadBuilder, Route, VariantCall};
use crate::error::DispatchError;
use crate::shared::{BackendVariant, RequestEnvelope};

/// Direct search/answer service. Memoryless: no session id or conversation tag is ever sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectBuilder;

impl PayloadBuilder for DirectBuilder {
    fn variant(&self) -> BackendVariant {
        BackendVariant::Direct
    }

    fn answer(&self, shapes: &Shapes, env: &RequestEnvelope) -> Result<VariantCall, DispatchError> {
        required_text(env, "query")?;
        Ok(VariantCall::stateless(
            Route::Answer,
            shapes.direct_answer(env, self.variant().wire_name()),
        ))
    }

    /// Same single-turn answer call; the turn's session id is tracked for the caller only.
    fn chat(&self, shapes: &Shapes, env: &RequestEnvelope) -> Result<VariantCall, DispatchError> {
        required_text(env, "message")?;
        Ok(VariantCall {
            route: Route::Answer,
            payload: shapes.direct_answer(env, self.variant().wire_name()),
            session_id: Some(session_or_new(env)),
        })
    }
}
