//! Dispatched routes: validate and build, call downstream with the caller's token, normalize.

use crate::auth::BearerToken;
use crate::error::ApiError;
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use std::time::Instant;
use switchboard_core::{normalize, ApiRequest, DownstreamError, LogicalAction, ResponseEnvelope};

type Body = Result<Json<ApiRequest>, JsonRejection>;
type Reply = Result<Json<ResponseEnvelope>, ApiError>;

async fn dispatch(state: &AppState, action: LogicalAction, bearer: Option<&str>, body: Body) -> Reply {
    let Json(request) = body.map_err(|e| ApiError::Body(e.body_text()))?;
    let env = request.into_envelope(action);

    let built = match state.dispatcher.build_request(action, &env) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(target: "switchboard::gateway", action = %action, error = %e, "request rejected");
            return Err(e.into());
        }
    };

    let started = Instant::now();
    let outcome = state
        .downstream
        .call(&built, bearer)
        .await
        .and_then(|raw| normalize(action, &built.variant_tag, raw).map_err(DownstreamError::from));
    let mut reply = match outcome {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(
                target: "switchboard::gateway",
                action = %action,
                variant = %built.variant_tag,
                route = %built.route,
                status = e.status(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %e,
                "action failed"
            );
            return Err(e.into());
        }
    };
    if action.is_multi_turn() {
        reply.session_id = reply.session_id.or(built.session_id);
    }

    tracing::info!(
        target: "switchboard::gateway",
        action = %action,
        variant = %built.variant_tag,
        route = %built.route,
        fallback = reply.fallback,
        citations = reply.citations.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "action completed"
    );
    Ok(Json(reply))
}

fn token(bearer: &Option<Extension<BearerToken>>) -> Option<&str> {
    bearer.as_ref().map(|Extension(BearerToken(t))| t.as_str())
}

/// POST /api/search
pub(crate) async fn search(State(state): State<AppState>, bearer: Option<Extension<BearerToken>>, body: Body) -> Reply {
    dispatch(&state, LogicalAction::Search, token(&bearer), body).await
}

/// POST /api/passages
pub(crate) async fn passages(State(state): State<AppState>, bearer: Option<Extension<BearerToken>>, body: Body) -> Reply {
    dispatch(&state, LogicalAction::Passages, token(&bearer), body).await
}

/// POST /api/answer
pub(crate) async fn answer(State(state): State<AppState>, bearer: Option<Extension<BearerToken>>, body: Body) -> Reply {
    dispatch(&state, LogicalAction::Answer, token(&bearer), body).await
}

/// POST /api/chat – the reply echoes the turn's `sessionId`.
pub(crate) async fn chat(State(state): State<AppState>, bearer: Option<Extension<BearerToken>>, body: Body) -> Reply {
    dispatch(&state, LogicalAction::Chat, token(&bearer), body).await
}

/// POST /api/suggest
pub(crate) async fn suggest(State(state): State<AppState>, bearer: Option<Extension<BearerToken>>, body: Body) -> Reply {
    dispatch(&state, LogicalAction::Suggest, token(&bearer), body).await
}

/// POST /api/html – content preview; `uniqueId` is required.
pub(crate) async fn html(State(state): State<AppState>, bearer: Option<Extension<BearerToken>>, body: Body) -> Reply {
    dispatch(&state, LogicalAction::Content, token(&bearer), body).await
}
