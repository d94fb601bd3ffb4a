use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Ready iff at least one agent is connected, per §6's readiness contract.
pub async fn ready_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let agent_count = state.agents.list().len();
    if agent_count > 0 {
        (StatusCode::OK, Json(json!({ "status": "ready", "agents": agent_count })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "agents": 0 })),
        )
    }
}
