//! Liveness endpoint.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::context::AppContext;

/// GET /health
pub async fn health_check(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": ctx.sessions.session_count(),
    }))
}
