use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use relaygate_conversation::SendRequest;
use relaygate_core::ids::{PrincipalId, RoleName};
use relaygate_protocol::auth::AuthMetadata;
use relaygate_protocol::frames::{EventFrame, InboundFrame, ReqFrame, ResFrame};
use relaygate_protocol::methods;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::state::AppState;

pub async fn client_ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_client_connection(socket, state))
}

async fn handle_client_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut tx, mut rx) = socket.split();

    let Some(Ok(Message::Text(first))) = rx.next().await else {
        return;
    };
    let connect: ReqFrame = match serde_json::from_str(&first) {
        Ok(req) => req,
        Err(e) => {
            warn!(error = %e, "malformed connect frame, closing");
            return;
        }
    };
    if connect.method != methods::CONNECT {
        let _ = send_json(&mut tx, &ResFrame::err(&connect.id, "PROTOCOL_ERROR", "must authenticate first")).await;
        return;
    }
    let auth: AuthMetadata = match connect.params.and_then(|p| serde_json::from_value(p).ok()) {
        Some(auth) => auth,
        None => {
            let _ = send_json(&mut tx, &ResFrame::err(&connect.id, "PROTOCOL_ERROR", "invalid connect params")).await;
            return;
        }
    };

    let ctx = match state.auth.authenticate(auth) {
        Ok(ctx) => ctx,
        Err(e) => {
            let _ = send_json(&mut tx, &ResFrame::err(&connect.id, "AUTH_FAILED", &e.to_string())).await;
            return;
        }
    };
    let _ = send_json(
        &mut tx,
        &ResFrame::ok(
            &connect.id,
            json!({ "principal_id": ctx.principal_id.to_string(), "kind": ctx.kind.to_string() }),
        ),
    )
    .await;
    info!(principal_id = %ctx.principal_id, "client authenticated");

    let (event_tx, mut event_rx) = tokio::sync::mpsc::channel::<EventFrame>(256);
    let seq = Arc::new(AtomicU64::new(0));

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let frame: InboundFrame = match serde_json::from_str(&text) {
                            Ok(f) => f,
                            Err(e) => {
                                warn!(error = %e, "malformed client frame, ignoring");
                                continue;
                            }
                        };
                        let Some(req) = frame.as_req() else { continue };
                        let res = dispatch_method(&state, &ctx, &req, event_tx.clone(), seq.clone()).await;
                        if send_json(&mut tx, &res).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                if let Some(event) = event {
                    if send_json(&mut tx, &event).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    info!(principal_id = %ctx.principal_id, "client disconnected");
}

async fn dispatch_method(
    state: &Arc<AppState>,
    ctx: &relaygate_auth::AuthContext,
    req: &ReqFrame,
    event_tx: tokio::sync::mpsc::Sender<EventFrame>,
    seq: Arc<AtomicU64>,
) -> ResFrame {
    match req.method.as_str() {
        methods::ME_GET => ResFrame::ok(
            &req.id,
            json!({
                "principal_id": ctx.principal_id.to_string(),
                "kind": ctx.kind.to_string(),
                "roles": ctx.roles.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
            }),
        ),

        methods::CONVERSATION_SEND => handle_send(state, ctx, req, event_tx, seq).await,

        methods::CONVERSATION_STREAM => handle_stream_events(state, req),

        methods::ADMIN_PRINCIPALS_LIST => admin_gate(ctx, &req.id, || {
            state
                .store
                .list_principals()
                .map(|principals| json!({ "principals": principals }))
                .map_err(|e| e.to_string())
        }),

        methods::ADMIN_PRINCIPALS_CREATE => admin_gate(ctx, &req.id, || {
            let result = create_principal(state, req)?;
            audit(state, ctx, "principals.create", &result.to_string());
            Ok(result)
        }),

        methods::ADMIN_PRINCIPALS_DELETE => admin_gate(ctx, &req.id, || {
            let id = param_str(req, "principal_id")?;
            state
                .store
                .delete_principal(&PrincipalId::from(id.clone()))
                .map_err(|e| e.to_string())?;
            audit(state, ctx, "principals.delete", &id);
            Ok(json!({ "deleted": true }))
        }),

        methods::ADMIN_ROLES_ADD => admin_gate(ctx, &req.id, || modify_role(state, ctx, req, true)),
        methods::ADMIN_ROLES_REMOVE => admin_gate(ctx, &req.id, || modify_role(state, ctx, req, false)),

        methods::ADMIN_BINDINGS_LIST => admin_gate(ctx, &req.id, || {
            state
                .bindings
                .list()
                .map(|bindings| json!({ "bindings": bindings }))
                .map_err(|e| e.to_string())
        }),

        methods::ADMIN_BINDINGS_CREATE => admin_gate(ctx, &req.id, || create_binding(state, ctx, req)),

        methods::ADMIN_BINDINGS_DELETE => admin_gate(ctx, &req.id, || {
            let frontend = param_str(req, "frontend")?;
            let channel_id = param_str(req, "channel_id")?;
            state
                .bindings
                .unbind(&frontend, &channel_id)
                .map_err(|e| e.to_string())?;
            audit(state, ctx, "bindings.delete", &format!("{frontend}/{channel_id}"));
            Ok(json!({ "deleted": true }))
        }),

        methods::ADMIN_AUDIT_LIST => admin_gate(ctx, &req.id, || {
            let limit = req.params.as_ref().and_then(|p| p.get("limit")).and_then(Value::as_i64).unwrap_or(50);
            state
                .store
                .list_audit(limit)
                .map(|entries| json!({ "entries": entries }))
                .map_err(|e| e.to_string())
        }),

        methods::ADMIN_TOKENS_CREATE => admin_gate(ctx, &req.id, || create_token(state, ctx, req)),

        // A bearer token carries no server-side identity beyond its subject
        // principal, so revoking access means revoking the principal itself.
        methods::ADMIN_TOKENS_REVOKE => admin_gate(ctx, &req.id, || {
            let principal_id = param_str(req, "principal_id")?;
            state
                .store
                .set_principal_status(&PrincipalId::from(principal_id.clone()), relaygate_core::ids::PrincipalStatus::Revoked)
                .map_err(|e| e.to_string())?;
            audit(state, ctx, "tokens.revoke", &principal_id);
            Ok(json!({ "revoked": true }))
        }),

        other => ResFrame::err(&req.id, "METHOD_NOT_FOUND", &format!("method '{other}' not implemented")),
    }
}

/// Default thread grouping for the client RPC surface's `SendMessage`,
/// which carries no frontend/channel identity of its own (§6).
const CLIENT_SEND_FRONTEND: &str = "client";

async fn handle_send(
    state: &Arc<AppState>,
    ctx: &relaygate_auth::AuthContext,
    req: &ReqFrame,
    event_tx: tokio::sync::mpsc::Sender<EventFrame>,
    seq: Arc<AtomicU64>,
) -> ResFrame {
    let params = req.params.clone().unwrap_or(Value::Null);
    // §6: `SendMessage(conversation_key, content, attachments)` — the
    // conversation key is the target agent id (Glossary: "conversation key,
    // usually the agent id").
    let conversation_key = match params.get("conversation_key").and_then(Value::as_str) {
        Some(key) => key.to_string(),
        None => return ResFrame::err(&req.id, "INVALID_ARGUMENT", "missing conversation_key"),
    };
    let content = match params.get("content").and_then(Value::as_str) {
        Some(c) => c.to_string(),
        None => return ResFrame::err(&req.id, "INVALID_ARGUMENT", "missing content"),
    };
    let attachments = params.get("attachments").and_then(Value::as_array).cloned().unwrap_or_default();

    let send_result = state
        .conversation
        .send(SendRequest {
            thread_id: None,
            frontend: CLIENT_SEND_FRONTEND.to_string(),
            external_thread_id: conversation_key.clone(),
            agent_id: PrincipalId::from(conversation_key),
            sender: ctx.principal_id.to_string(),
            content,
            attachments,
        })
        .await;

    let (request_id, thread_id, mut rx) = match send_result {
        Ok(v) => v,
        Err(e) => return ResFrame::err(&req.id, &e.kind().code().to_uppercase(), &e.to_string()),
    };

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let terminal = event.kind.is_terminal();
            let frame = EventFrame::new(
                "conversation.event",
                json!({ "request_id": event.request_id.to_string(), "thread_id": event.thread_id.to_string(), "kind": event.kind }),
            )
            .with_seq(seq.fetch_add(1, Ordering::Relaxed));
            if event_tx.send(frame).await.is_err() || terminal {
                break;
            }
        }
    });

    ResFrame::ok(
        &req.id,
        json!({ "request_id": request_id.to_string(), "thread_id": thread_id.to_string() }),
    )
}

fn handle_stream_events(state: &Arc<AppState>, req: &ReqFrame) -> ResFrame {
    let conversation_key = match param_str(req, "conversation_key") {
        Ok(key) => key,
        Err(message) => return ResFrame::err(&req.id, "INVALID_ARGUMENT", &message),
    };
    let cursor = req.params.as_ref().and_then(|p| p.get("cursor")).and_then(Value::as_str);
    let limit = req.params.as_ref().and_then(|p| p.get("limit")).and_then(Value::as_i64);

    match state.store.list_events_by_conversation(&conversation_key, cursor, limit) {
        Ok(page) => ResFrame::ok(
            &req.id,
            json!({
                "events": page.items,
                "has_more": page.has_more,
                "next_cursor": page.next_cursor,
            }),
        ),
        Err(e) => ResFrame::err(&req.id, "INTERNAL", &e.to_string()),
    }
}

/// Records an admin-level action for after-the-fact review (§3 "Audit
/// Entry"). Best-effort: a failed audit write never fails the action it
/// describes, since the audit log is not consulted at request time.
fn audit(state: &Arc<AppState>, ctx: &relaygate_auth::AuthContext, action: &str, details: &str) {
    if let Err(e) = state.store.append_audit(&ctx.principal_id, action, details) {
        warn!(error = %e, action, "failed to record audit entry");
    }
}

fn admin_gate(
    ctx: &relaygate_auth::AuthContext,
    req_id: &str,
    op: impl FnOnce() -> Result<Value, String>,
) -> ResFrame {
    if !ctx.is_admin_or_owner() {
        return ResFrame::err(req_id, "PERMISSION_DENIED", "admin or owner role required");
    }
    match op() {
        Ok(payload) => ResFrame::ok(req_id, payload),
        Err(message) => ResFrame::err(req_id, "INTERNAL", &message),
    }
}

fn param_str(req: &ReqFrame, key: &str) -> Result<String, String> {
    req.params
        .as_ref()
        .and_then(|p| p.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("missing param '{key}'"))
}

fn create_principal(state: &Arc<AppState>, req: &ReqFrame) -> Result<Value, String> {
    let kind: relaygate_core::ids::PrincipalKind = param_str(req, "kind")?.parse()?;
    let display_name = param_str(req, "display_name")?;
    let fingerprint = req
        .params
        .as_ref()
        .and_then(|p| p.get("fingerprint"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let principal = state
        .store
        .create_principal(
            kind,
            fingerprint.as_deref(),
            &display_name,
            relaygate_core::ids::PrincipalStatus::Pending,
        )
        .map_err(|e| e.to_string())?;
    Ok(json!({ "principal": principal }))
}

fn modify_role(
    state: &Arc<AppState>,
    ctx: &relaygate_auth::AuthContext,
    req: &ReqFrame,
    add: bool,
) -> Result<Value, String> {
    let subject_kind: relaygate_core::ids::PrincipalKind = param_str(req, "subject_kind")?.parse()?;
    let subject_id = param_str(req, "subject_id")?;
    let role_name: RoleName = param_str(req, "role")?.parse()?;
    if add {
        state.store.add_role(subject_kind, &subject_id, role_name).map_err(|e| e.to_string())?;
    } else {
        state.store.remove_role(subject_kind, &subject_id, role_name).map_err(|e| e.to_string())?;
    }
    audit(
        state,
        ctx,
        if add { "roles.add" } else { "roles.remove" },
        &format!("{subject_kind}/{subject_id}/{role_name}"),
    );
    Ok(json!({ "ok": true }))
}

fn create_token(state: &Arc<AppState>, ctx: &relaygate_auth::AuthContext, req: &ReqFrame) -> Result<Value, String> {
    let principal_id = param_str(req, "principal_id")?;
    let ttl_secs = req
        .params
        .as_ref()
        .and_then(|p| p.get("ttl_secs"))
        .and_then(Value::as_i64)
        .unwrap_or(3600);

    state.store.get_principal(&PrincipalId::from(principal_id.clone())).map_err(|e| e.to_string())?;

    let now = chrono::Utc::now().timestamp();
    let claims = relaygate_protocol::auth::Claims {
        sub: principal_id,
        iat: now,
        exp: now + ttl_secs,
    };
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(state.config.auth.jwt_secret.as_bytes()),
    )
    .map_err(|e| e.to_string())?;
    audit(state, ctx, "tokens.create", &claims.sub);
    Ok(json!({ "token": token, "expires_at": claims.exp }))
}

fn create_binding(state: &Arc<AppState>, ctx: &relaygate_auth::AuthContext, req: &ReqFrame) -> Result<Value, String> {
    let frontend = param_str(req, "frontend")?;
    let channel_id = param_str(req, "channel_id")?;
    let instance_id = param_str(req, "instance_id")?;

    let result = state
        .bindings
        .bind(&frontend, &channel_id, &instance_id, &ctx.principal_id)
        .map_err(|e| e.to_string())?;

    audit(state, ctx, "bindings.create", &format!("{frontend}/{channel_id}"));

    match result {
        crate::binding::BindResult::Created(binding) => Ok(json!({ "binding": binding })),
        crate::binding::BindResult::Rebound { binding, previous_agent_id } => {
            Ok(json!({ "binding": binding, "rebound_from": previous_agent_id.to_string() }))
        }
    }
}

async fn send_json<T: serde::Serialize>(
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    payload: &T,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(payload).unwrap_or_default();
    tx.send(Message::Text(json.into())).await.map_err(axum::Error::new)
}
