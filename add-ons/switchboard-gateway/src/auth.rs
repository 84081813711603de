//! Bearer enforcement for the action routes.
//!
//! The token is not verified here; the downstream gateway is the authority. This layer rejects
//! requests that carry no usable token, or a JWT whose `exp` has passed, before any downstream
//! call is made, and hands the token to the handlers for verbatim forwarding.

use crate::error::unauthorized;
use crate::AppState;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use switchboard_core::{now_ms, token_expiry_ms};

/// Incoming bearer token, forwarded downstream unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BearerToken(pub(crate) String);

/// Token from an `Authorization: Bearer <token>` header value.
pub(crate) fn bearer_token(value: &str) -> Option<&str> {
    let s = value.trim();
    let prefix = "Bearer ";
    if s.len() > prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        let token = s[prefix.len()..].trim();
        if !token.is_empty() && !token.contains(char::is_whitespace) {
            return Some(token);
        }
    }
    None
}

fn is_expired(token: &str) -> bool {
    token_expiry_ms(token).map(|exp| exp <= now_ms()).unwrap_or(false)
}

enum Credential {
    Missing,
    Malformed,
    Expired,
    Present(String),
}

fn inspect(headers: &HeaderMap) -> Credential {
    let Some(raw) = headers.get(header::AUTHORIZATION) else {
        return Credential::Missing;
    };
    let Some(token) = raw.to_str().ok().and_then(bearer_token) else {
        return Credential::Malformed;
    };
    if is_expired(token) {
        return Credential::Expired;
    }
    Credential::Present(token.to_string())
}

pub(crate) async fn require_bearer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let enforce = state.config.auth.enforce;
    let path = req.uri().path().to_string();
    match inspect(req.headers()) {
        Credential::Present(token) => {
            req.extensions_mut().insert(BearerToken(token));
        }
        _ if !enforce => {}
        Credential::Missing => {
            tracing::warn!(target: "switchboard::auth", path = %path, "rejected: missing bearer token");
            return unauthorized("missing bearer token");
        }
        Credential::Malformed => {
            tracing::warn!(target: "switchboard::auth", path = %path, "rejected: malformed Authorization header");
            return unauthorized("malformed Authorization header");
        }
        Credential::Expired => {
            tracing::warn!(target: "switchboard::auth", path = %path, "rejected: expired token");
            return unauthorized("token expired");
        }
    }
    next.run(req).await
}
