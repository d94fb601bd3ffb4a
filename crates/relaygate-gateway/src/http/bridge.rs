use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures_util::stream::Stream;
use relaygate_conversation::SendRequest;
use relaygate_core::ids::{PrincipalId, ThreadId};
use serde::Deserialize;
use serde_json::json;

use crate::authn::{authenticate_http, status_for_kind};
use crate::binding::BindResult;
use crate::state::AppState;

/// Default grouping used for threads created by a direct `agent_id` send
/// that supplies no `frontend`/`channel_id` of its own.
const DIRECT_SEND_FRONTEND: &str = "http";

#[derive(Deserialize)]
pub struct SendBody {
    pub content: String,
    pub sender: String,
    pub frontend: Option<String>,
    pub channel_id: Option<String>,
    pub thread_id: Option<String>,
    pub agent_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
}

/// `POST /api/send` — dispatches a message and streams the reply as SSE,
/// terminated by a `done` event, per §6. The target agent is resolved
/// either directly from `agent_id` or, when absent, via the binding
/// recorded for (`frontend`, `channel_id`).
pub async fn send_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SendBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<serde_json::Value>)> {
    authenticate_http(&state, &headers)?;

    let (frontend, external_thread_id, agent_id) = match body.agent_id {
        Some(agent_id) => {
            let external_thread_id = body
                .channel_id
                .clone()
                .unwrap_or_else(|| agent_id.clone());
            (
                body.frontend.unwrap_or_else(|| DIRECT_SEND_FRONTEND.to_string()),
                external_thread_id,
                PrincipalId::from(agent_id),
            )
        }
        None => {
            let (frontend, channel_id) = match (body.frontend, body.channel_id) {
                (Some(frontend), Some(channel_id)) => (frontend, channel_id),
                _ => {
                    return Err((
                        StatusCode::BAD_REQUEST,
                        Json(json!({ "error": "must supply agent_id, or both frontend and channel_id" })),
                    ))
                }
            };
            let binding = state
                .bindings
                .get(&frontend, &channel_id)
                .map_err(|err| (status_for_kind(err.kind()), Json(json!({ "error": err.to_string() }))))?
                .ok_or_else(|| {
                    (
                        StatusCode::NOT_FOUND,
                        Json(json!({ "error": format!("no binding for {frontend}/{channel_id}") })),
                    )
                })?;
            (frontend, channel_id, binding.agent_principal_id)
        }
    };

    let (_, _, mut rx) = state
        .conversation
        .send(SendRequest {
            thread_id: body.thread_id.map(ThreadId::from),
            frontend,
            external_thread_id,
            agent_id,
            sender: body.sender,
            content: body.content,
            attachments: body.attachments,
        })
        .await
        .map_err(|err| (status_for_kind(err.kind()), Json(json!({ "error": err.to_string() }))))?;

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let terminal = event.kind.is_terminal();
            let payload = serde_json::to_string(&event.kind).unwrap_or_default();
            yield Ok(Event::default().event(sse_event_name(&event.kind)).data(payload));
            if terminal {
                break;
            }
        }
    };

    Ok(Sse::new(stream))
}

fn sse_event_name(kind: &relaygate_protocol::agent::TranslatedKind) -> &'static str {
    use relaygate_protocol::agent::TranslatedKind::*;
    match kind {
        Text { .. } => "text",
        Thinking { .. } => "thinking",
        ToolUse { .. } => "tool_use",
        ToolResult { .. } => "tool_result",
        File { .. } => "file",
        Done { .. } => "done",
        Error { .. } => "error",
        SessionInit { .. } => "session_init",
        SessionOrphaned { .. } => "session_orphaned",
        Usage { .. } => "usage",
        ToolState { .. } => "tool_state",
        Canceled => "canceled",
        ToolApprovalRequest { .. } => "tool_approval_request",
        Unknown => "unknown",
    }
}

#[derive(Deserialize)]
pub struct BindingQuery {
    pub frontend: String,
    pub channel_id: String,
}

#[derive(Deserialize)]
pub struct CreateBindingBody {
    pub frontend: String,
    pub channel_id: String,
    pub instance_id: String,
}

/// `POST /api/bindings` — binds a (frontend, channel) pair to the agent
/// currently connected under `instance_id`, per §4.6/§6.
pub async fn create_binding_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBindingBody>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let ctx = authenticate_http(&state, &headers)?;
    if !ctx.is_admin_or_owner() {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "admin or owner role required" })),
        ));
    }

    let result = state
        .bindings
        .bind(&body.frontend, &body.channel_id, &body.instance_id, &ctx.principal_id)
        .map_err(|err| (status_for_kind(err.kind()), Json(json!({ "error": err.to_string() }))))?;

    match result {
        BindResult::Created(binding) => Ok(Json(json!({ "binding": binding }))),
        BindResult::Rebound { binding, previous_agent_id } => Ok(Json(json!({
            "binding": binding,
            "rebound_from": previous_agent_id.to_string(),
        }))),
    }
}

/// `GET /api/bindings?frontend=&channel_id=` — single binding lookup plus
/// online flag, per §6.
pub async fn get_binding_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<BindingQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    authenticate_http(&state, &headers)?;
    let binding = state.bindings.get(&q.frontend, &q.channel_id).map_err(internal_error)?;
    match binding {
        Some(binding) => {
            let online = state.bindings.is_agent_online(&binding);
            Ok(Json(json!({ "binding": binding, "agent_online": online })))
        }
        None => Err((StatusCode::NOT_FOUND, Json(json!({ "error": "binding not found" })))),
    }
}

/// `DELETE /api/bindings?frontend=&channel_id=`, per §6.
pub async fn delete_binding_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<BindingQuery>,
) -> Result<StatusCode, (StatusCode, Json<serde_json::Value>)> {
    let ctx = authenticate_http(&state, &headers)?;
    if !ctx.is_admin_or_owner() {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "admin or owner role required" })),
        ));
    }
    state.bindings.unbind(&q.frontend, &q.channel_id).map_err(internal_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_agents_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    authenticate_http(&state, &headers)?;
    let agents: Vec<_> = state
        .agents
        .list()
        .into_iter()
        .map(|conn| {
            json!({
                "agent_id": conn.agent_id.to_string(),
                "name": conn.name,
                "capabilities": conn.capabilities,
                "working_dir": conn.working_dir,
            })
        })
        .collect();
    Ok(Json(json!({ "agents": agents })))
}

fn internal_error(err: relaygate_ledger::LedgerError) -> (StatusCode, Json<serde_json::Value>) {
    (status_for_kind(err.kind()), Json(json!({ "error": err.to_string() })))
}
