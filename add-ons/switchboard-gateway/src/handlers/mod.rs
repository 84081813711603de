//! Route handlers. `actions` holds the dispatched `/api/*` routes; the utility routes live here.

pub(crate) mod actions;

use crate::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use switchboard_core::{BackendVariant, LogicalAction};

/// GET /api/health – liveness check for the UI and scripts.
pub(crate) async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "service": state.config.app_name }))
}

/// GET /api/config – public settings the UI needs before login.
pub(crate) async fn public_config(State(state): State<AppState>) -> Json<Value> {
    let cfg = &state.config;
    let variants: Vec<&str> = BackendVariant::ALL.iter().map(|v| v.wire_name()).collect();
    let routes: Vec<String> = LogicalAction::ALL
        .iter()
        .map(|a| format!("/api/{}", a.boundary_path()))
        .collect();
    Json(json!({
        "app_name": cfg.app_name,
        "variants": variants,
        "default_variant": BackendVariant::Direct.wire_name(),
        "routes": routes,
        "auth_enforced": cfg.auth.enforce,
        "auth": {
            "user_pool_id": cfg.auth.user_pool_id,
            "client_id": cfg.auth.client_id,
            "domain": cfg.auth.domain,
            "region": cfg.auth.region,
        },
    }))
}
