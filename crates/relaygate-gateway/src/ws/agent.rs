use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use relaygate_agents::OutboundFrame;
use relaygate_core::ids::{PrincipalKind, RequestId};
use relaygate_protocol::agent::{Heartbeat, MessageResponse, Register, Welcome};
use relaygate_protocol::auth::AuthMetadata;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// First frame on an agent control stream: SSH auth metadata plus the
/// registration payload that authenticates and registers the connection
/// in one round trip.
#[derive(Deserialize)]
struct AgentHello {
    auth: AuthMetadata,
    register: Register,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AgentInbound {
    MessageResponse(MessageResponse),
    Heartbeat(Heartbeat),
}

pub async fn agent_ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_agent_connection(socket, state))
}

async fn handle_agent_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut tx, mut rx) = socket.split();

    let Some(Ok(Message::Text(first))) = rx.next().await else {
        return;
    };
    let hello: AgentHello = match serde_json::from_str(&first) {
        Ok(h) => h,
        Err(e) => {
            warn!(error = %e, "malformed agent hello, closing");
            return;
        }
    };

    let ctx = match state.auth.authenticate(hello.auth) {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!(error = %e, "agent authentication failed");
            let _ = send_json(&mut tx, &serde_json::json!({ "type": "error", "message": e.to_string() })).await;
            return;
        }
    };
    if ctx.kind != PrincipalKind::Agent {
        warn!("non-agent principal on /agent/ws, closing");
        return;
    }

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(32);
    if let Err(e) = state.agents.register(
        ctx.principal_id.clone(),
        hello.register.name,
        hello.register.capabilities,
        hello.register.working_dir,
        hello.register.instance_id,
        outbound_tx,
    ) {
        warn!(error = %e, "agent registration rejected");
        let _ = send_json(&mut tx, &serde_json::json!({ "type": "error", "message": e.to_string() })).await;
        return;
    }

    let welcome = Welcome {
        server_id: "relaygate".to_string(),
        agent_id: ctx.principal_id.to_string(),
    };
    if send_json(&mut tx, &welcome).await.is_err() {
        state.agents.deregister(&ctx.principal_id);
        return;
    }
    info!(agent_id = %ctx.principal_id, "agent connected");

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<AgentInbound>(&text) {
                            Ok(AgentInbound::MessageResponse(resp)) => {
                                state.agents.route_reply(
                                    &ctx.principal_id,
                                    &RequestId::from(resp.request_id),
                                    resp.event,
                                );
                            }
                            Ok(AgentInbound::Heartbeat(hb)) => {
                                debug!(agent_id = %ctx.principal_id, ts_ms = hb.ts_ms, "agent heartbeat");
                            }
                            Err(e) => warn!(agent_id = %ctx.principal_id, error = %e, "malformed agent frame"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            frame = outbound_rx.recv() => {
                match frame {
                    Some(OutboundFrame::SendMessage(msg)) => {
                        if send_json(&mut tx, &serde_json::json!({ "type": "send_message", "frame": msg })).await.is_err() {
                            break;
                        }
                    }
                    Some(OutboundFrame::Shutdown(msg)) => {
                        let _ = send_json(&mut tx, &serde_json::json!({ "type": "shutdown", "frame": msg })).await;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.agents.deregister(&ctx.principal_id);
    info!(agent_id = %ctx.principal_id, "agent disconnected");
}

async fn send_json<T: serde::Serialize>(
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    payload: &T,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(payload).unwrap_or_default();
    tx.send(Message::Text(json.into())).await.map_err(axum::Error::new)
}
