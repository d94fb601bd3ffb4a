use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use relaygate_core::ids::PrincipalKind;
use relaygate_protocol::auth::AuthMetadata;
use relaygate_protocol::pack::{ExecuteTool, Manifest, ToolResult};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Deserialize)]
struct PackHello {
    auth: AuthMetadata,
    manifest: Manifest,
}

pub async fn pack_ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_pack_connection(socket, state))
}

async fn handle_pack_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut tx, mut rx) = socket.split();

    let Some(Ok(Message::Text(first))) = rx.next().await else {
        return;
    };
    let hello: PackHello = match serde_json::from_str(&first) {
        Ok(h) => h,
        Err(e) => {
            warn!(error = %e, "malformed pack hello, closing");
            return;
        }
    };

    let ctx = match state.auth.authenticate(hello.auth) {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!(error = %e, "pack authentication failed");
            let _ = send_json(&mut tx, &serde_json::json!({ "type": "error", "message": e.to_string() })).await;
            return;
        }
    };
    if ctx.kind != PrincipalKind::Pack {
        warn!("non-pack principal on /pack/ws, closing");
        return;
    }

    let pack_id = hello.manifest.pack_id.clone();
    let (dispatch_tx, mut dispatch_rx) = mpsc::channel::<ExecuteTool>(32);
    if let Err(e) = state.packs.register_manifest(
        pack_id.clone(),
        hello.manifest.version,
        hello.manifest.tools,
        dispatch_tx,
    ) {
        warn!(error = %e, "pack registration rejected");
        let _ = send_json(&mut tx, &serde_json::json!({ "type": "error", "message": e.to_string() })).await;
        return;
    }
    info!(%pack_id, "pack connected");

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ToolResult>(&text) {
                            Ok(result) => state.tool_router.route_result(result),
                            Err(e) => warn!(%pack_id, error = %e, "malformed tool result"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            execute = dispatch_rx.recv() => {
                match execute {
                    Some(call) => {
                        if send_json(&mut tx, &call).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.packs.deregister(&pack_id);
    info!(%pack_id, "pack disconnected");
}

async fn send_json<T: serde::Serialize>(
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    payload: &T,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(payload).unwrap_or_default();
    tx.send(Message::Text(json.into())).await.map_err(axum::Error::new)
}
