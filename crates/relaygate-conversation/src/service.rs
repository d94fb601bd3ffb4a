use std::sync::Arc;
use std::time::Duration;

use relaygate_agents::{AgentRegistry, DispatchRequest};
use relaygate_core::ids::{PrincipalId, RequestId, ThreadId};
use relaygate_ledger::{EventDirection, EventType, LedgerError, NewEvent, Store, Thread};
use relaygate_packs::ToolRouter;
use relaygate_protocol::agent::TranslatedKind;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

/// Per-send timeout for forwarding a translated event to the caller's
/// channel, per §4.5's "every event forwarded to the caller uses a bounded
/// send; a slow caller loses events rather than stalling the agent."
const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

/// Short timeout for the detached persistence writes that follow a
/// terminal event, so a caller's cancellation never aborts an in-flight
/// ledger write.
const PERSIST_TIMEOUT: Duration = Duration::from_secs(5);

use crate::error::ConversationError;

pub struct SendRequest {
    /// Explicit thread to fetch-or-create. When absent the thread is
    /// resolved by (frontend, external_thread_id) instead (§4.5 step 1).
    pub thread_id: Option<ThreadId>,
    pub frontend: String,
    pub external_thread_id: String,
    pub agent_id: PrincipalId,
    pub sender: String,
    pub content: String,
    pub attachments: Vec<Value>,
}

/// Forwarded to the caller for every agent reply; mirrors `TranslatedEvent`
/// but carries the resolved thread id for convenience.
pub struct ConversationEvent {
    pub request_id: RequestId,
    pub thread_id: ThreadId,
    pub kind: TranslatedKind,
}

/// Wires the ledger, the agent registry, and the caller's outbound channel
/// together per §4.5's ledger-first write path.
pub struct ConversationService {
    store: Arc<Store>,
    agents: Arc<AgentRegistry>,
    tool_router: Arc<ToolRouter>,
}

impl ConversationService {
    pub fn new(store: Arc<Store>, agents: Arc<AgentRegistry>, tool_router: Arc<ToolRouter>) -> Self {
        Self { store, agents, tool_router }
    }

    /// Resolves the thread for a send (§4.5 step 1). With an explicit thread
    /// id, fetches it or creates it under that id. Otherwise looks up by
    /// (frontend, external_thread_id), creating on not-found. `CreateThread`
    /// surfaces a distinct duplicate error rather than swallowing it — a
    /// loser of the creation race just re-reads under the unique key.
    fn resolve_thread(&self, req: &SendRequest) -> Result<Thread, ConversationError> {
        if let Some(thread_id) = &req.thread_id {
            return match self.store.get_thread(thread_id) {
                Ok(thread) => Ok(thread),
                Err(LedgerError::NotFound(_)) => Ok(self.store.create_thread(
                    Some(thread_id),
                    &req.frontend,
                    &req.external_thread_id,
                    &req.agent_id,
                )?),
                Err(e) => Err(e.into()),
            };
        }

        if let Some(thread) = self.store.get_thread_by_external(&req.frontend, &req.external_thread_id)? {
            return Ok(thread);
        }
        match self.store.create_thread(None, &req.frontend, &req.external_thread_id, &req.agent_id) {
            Ok(thread) => Ok(thread),
            Err(LedgerError::AlreadyExists(_)) => self
                .store
                .get_thread_by_external(&req.frontend, &req.external_thread_id)?
                .ok_or_else(|| LedgerError::NotFound(format!("thread ({}, {})", req.frontend, req.external_thread_id)).into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolves the thread, records the inbound event, dispatches to the
    /// agent, and returns a channel of events mirrored to the caller while
    /// a background task persists the conversation's outbound side.
    pub async fn send(
        &self,
        req: SendRequest,
    ) -> Result<(RequestId, ThreadId, mpsc::Receiver<ConversationEvent>), ConversationError> {
        let thread = self.resolve_thread(&req)?;

        // Per the Glossary's "conversation key (usually the agent id)" —
        // the store's conversation_key is keyed on the resolved target
        // agent, not on (frontend, thread), so a read by agent id always
        // finds events filed under a send targeting that agent.
        let conversation_key = req.agent_id.to_string();

        // Ledger-first: a failed write means no agent work is ever started.
        self.store.append_event(NewEvent {
            conversation_key: conversation_key.clone(),
            thread_id: Some(thread.id.clone()),
            direction: EventDirection::InboundToAgent,
            author: req.sender.clone(),
            event_type: EventType::Message,
            text: Some(req.content.clone()),
            raw_ref: None,
        })?;

        let agent_id = req.agent_id.clone();
        let (request_id, mut raw_rx) = self
            .agents
            .dispatch(DispatchRequest {
                target_agent_id: req.agent_id,
                thread_id: Some(thread.id.clone()),
                sender: req.sender,
                content: req.content,
                attachments: req.attachments,
            })
            .await?;

        let (caller_tx, caller_rx) = mpsc::channel::<ConversationEvent>(64);

        let store = self.store.clone();
        let tool_router = self.tool_router.clone();
        let thread_id = thread.id.clone();
        let worker_request_id = request_id.clone();
        tokio::spawn(async move {
            let mut accumulated = String::new();
            let mut saw_delta = false;

            while let Some(event) = raw_rx.recv().await {
                record_outbound(&store, &conversation_key, &thread_id, &worker_request_id, &event.kind, &mut accumulated, &mut saw_delta)
                    .await;

                // Per the ledger-first write path: a tool-use event is routed
                // through the pack router and its result injected back into
                // this same event stream, without blocking subsequent agent
                // events (the agent may emit several tool_use events before
                // any result returns).
                if let TranslatedKind::ToolUse { tool_call_id, tool_name, input } = &event.kind {
                    spawn_tool_call(
                        tool_router.clone(),
                        store.clone(),
                        caller_tx.clone(),
                        conversation_key.clone(),
                        thread_id.clone(),
                        worker_request_id.clone(),
                        agent_id.clone(),
                        tool_call_id.clone(),
                        tool_name.clone(),
                        input.clone(),
                    );
                }

                let terminal = event.kind.is_terminal();
                let forwarded = ConversationEvent {
                    request_id: worker_request_id.clone(),
                    thread_id: thread_id.clone(),
                    kind: event.kind,
                };
                match tokio::time::timeout(FORWARD_TIMEOUT, caller_tx.send(forwarded)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => break,
                    Err(_) => warn!(request_id = %worker_request_id, "caller too slow, dropping event"),
                }
                if terminal {
                    break;
                }
            }
        });

        Ok((request_id, thread.id, caller_rx))
    }
}

/// Executes a tool call in the background and injects its result back into
/// both the ledger and the caller's event stream, per §2's control flow
/// ("when the agent emits a tool-use event, it is routed through Pack
/// Router (4) to a pack and the result is injected back into the same
/// stream"). A tool the router doesn't recognize, or that fails, still
/// produces a `tool_result` event carrying the error, never a dropped call.
#[allow(clippy::too_many_arguments)]
fn spawn_tool_call(
    tool_router: Arc<ToolRouter>,
    store: Arc<Store>,
    caller_tx: mpsc::Sender<ConversationEvent>,
    conversation_key: String,
    thread_id: ThreadId,
    request_id: RequestId,
    agent_id: PrincipalId,
    tool_call_id: String,
    tool_name: String,
    input: Value,
) {
    tokio::spawn(async move {
        let tool_request_id = RequestId::from(tool_call_id.clone());
        let outcome = tool_router.call(&tool_name, input, tool_request_id, &agent_id).await;
        let (output, is_error) = match outcome {
            Ok(output) => (output, false),
            Err(err) => (Value::String(err.to_string()), true),
        };

        persist_event(
            &store,
            &conversation_key,
            &thread_id,
            if is_error { EventType::Error } else { EventType::ToolResult },
            tool_call_id.clone(),
            Some(output.to_string()),
        )
        .await;

        let forwarded = ConversationEvent {
            request_id,
            thread_id,
            kind: TranslatedKind::ToolResult { tool_call_id, output, is_error },
        };
        if tokio::time::timeout(FORWARD_TIMEOUT, caller_tx.send(forwarded)).await.is_err() {
            warn!("caller too slow, dropping routed tool result");
        }
    });
}

async fn record_outbound(
    store: &Arc<Store>,
    conversation_key: &str,
    thread_id: &ThreadId,
    request_id: &RequestId,
    kind: &TranslatedKind,
    accumulated: &mut String,
    saw_delta: &mut bool,
) {
    match kind {
        TranslatedKind::Text { delta } => {
            accumulated.push_str(delta);
            *saw_delta = true;
        }
        TranslatedKind::ToolUse { tool_call_id, tool_name, input } => {
            persist_event(
                store,
                conversation_key,
                thread_id,
                EventType::ToolCall,
                format!("{tool_name}({tool_call_id})"),
                Some(input.to_string()),
            )
            .await;
        }
        TranslatedKind::ToolResult { tool_call_id, output, is_error } => {
            let event_type = if *is_error { EventType::Error } else { EventType::ToolResult };
            persist_event(
                store,
                conversation_key,
                thread_id,
                event_type,
                tool_call_id.clone(),
                Some(output.to_string()),
            )
            .await;
        }
        TranslatedKind::Usage { input_tokens, output_tokens } => {
            let store = store.clone();
            let request_id = request_id.to_string();
            let input_tokens = *input_tokens as i64;
            let output_tokens = *output_tokens as i64;
            let _ = tokio::time::timeout(PERSIST_TIMEOUT, async move {
                if let Err(err) = store.save_usage(&request_id, input_tokens, output_tokens) {
                    warn!(%err, "failed to save token usage");
                }
            })
            .await;
        }
        TranslatedKind::Done { full_response } => {
            let text = full_response
                .clone()
                .unwrap_or_else(|| if *saw_delta { accumulated.clone() } else { String::new() });
            let store = store.clone();
            let conversation_key = conversation_key.to_string();
            let thread_id = thread_id.clone();
            let request_id = request_id.to_string();
            let _ = tokio::time::timeout(PERSIST_TIMEOUT, async move {
                match store.append_event(NewEvent {
                    conversation_key,
                    thread_id: Some(thread_id),
                    direction: EventDirection::OutboundFromAgent,
                    author: "agent".to_string(),
                    event_type: EventType::Message,
                    text: Some(text),
                    raw_ref: None,
                }) {
                    Ok(message_event) => {
                        if let Err(err) = store.link_usage_to_message(&request_id, &message_event.id) {
                            warn!(%err, "failed to link usage to message");
                        }
                    }
                    Err(err) => warn!(%err, "failed to persist outbound message"),
                }
            })
            .await;
        }
        TranslatedKind::Error { message } => {
            persist_event(store, conversation_key, thread_id, EventType::Error, "agent".to_string(), Some(message.clone())).await;
        }
        _ => {}
    }
}

async fn persist_event(
    store: &Arc<Store>,
    conversation_key: &str,
    thread_id: &ThreadId,
    event_type: EventType,
    author: String,
    text: Option<String>,
) {
    let store = store.clone();
    let conversation_key = conversation_key.to_string();
    let thread_id = thread_id.clone();
    let _ = tokio::time::timeout(PERSIST_TIMEOUT, async move {
        if let Err(err) = store.append_event(NewEvent {
            conversation_key,
            thread_id: Some(thread_id),
            direction: EventDirection::OutboundFromAgent,
            author,
            event_type,
            text,
            raw_ref: None,
        }) {
            warn!(%err, "failed to persist outbound event");
        }
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaygate_agents::OutboundFrame;
    use relaygate_core::ids::PrincipalKind;
    use relaygate_packs::PackRegistry;
    use relaygate_protocol::agent::RawReplyEvent;

    fn test_tool_router() -> Arc<ToolRouter> {
        Arc::new(ToolRouter::new(Arc::new(PackRegistry::new())))
    }

    #[tokio::test]
    async fn send_records_inbound_event_before_dispatch() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let agents = Arc::new(AgentRegistry::new());
        let agent_id = PrincipalId::new();
        let (outbound_tx, mut outbound_rx) = mpsc::channel(4);
        agents
            .register(agent_id.clone(), "agent".into(), vec![], None, None, outbound_tx)
            .unwrap();

        let service = ConversationService::new(store.clone(), agents.clone(), test_tool_router());
        let (request_id, thread_id, _rx) = service
            .send(SendRequest {
                thread_id: None,
                frontend: "slack".into(),
                external_thread_id: "chan-1".into(),
                agent_id: agent_id.clone(),
                sender: "alice".into(),
                content: "hello".into(),
                attachments: vec![],
            })
            .await
            .unwrap();

        let page = store.list_events_by_thread(&thread_id, None, None).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].text.as_deref(), Some("hello"));

        let sent = outbound_rx.recv().await.unwrap();
        match sent {
            OutboundFrame::SendMessage(msg) => assert_eq!(msg.request_id, request_id.to_string()),
            _ => panic!("expected SendMessage"),
        }

        agents.route_reply(&agent_id, &request_id, RawReplyEvent::Canceled);
    }

    #[tokio::test]
    async fn done_event_persists_accumulated_text_and_links_usage() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let agents = Arc::new(AgentRegistry::new());
        let agent_id = PrincipalId::new();
        let (outbound_tx, mut outbound_rx) = mpsc::channel(4);
        agents
            .register(agent_id.clone(), "agent".into(), vec![], None, None, outbound_tx)
            .unwrap();

        let service = ConversationService::new(store.clone(), agents.clone(), test_tool_router());
        let (request_id, thread_id, mut rx) = service
            .send(SendRequest {
                thread_id: None,
                frontend: "slack".into(),
                external_thread_id: "chan-2".into(),
                agent_id: agent_id.clone(),
                sender: "alice".into(),
                content: "hi".into(),
                attachments: vec![],
            })
            .await
            .unwrap();

        let _sent = outbound_rx.recv().await.unwrap();

        agents.route_reply(&agent_id, &request_id, RawReplyEvent::Text { delta: "Hel".into() });
        agents.route_reply(&agent_id, &request_id, RawReplyEvent::Text { delta: "lo".into() });
        agents.route_reply(
            &agent_id,
            &request_id,
            RawReplyEvent::Usage { input_tokens: 10, output_tokens: 20 },
        );
        agents.route_reply(&agent_id, &request_id, RawReplyEvent::Done { full_response: None });

        let mut saw_done = false;
        while let Some(event) = rx.recv().await {
            if event.kind.is_terminal() {
                saw_done = true;
                break;
            }
        }
        assert!(saw_done);

        // allow the detached persistence task, run under its own timeout, to complete
        tokio::time::sleep(Duration::from_millis(50)).await;

        let page = store.list_events_by_thread(&thread_id, None, None).unwrap();
        let outbound_message = page
            .items
            .iter()
            .find(|e| matches!(e.direction, EventDirection::OutboundFromAgent) && matches!(e.event_type, EventType::Message))
            .expect("outbound message recorded");
        assert_eq!(outbound_message.text.as_deref(), Some("Hello"));

        let _ = PrincipalKind::Agent;
    }

    struct EchoPack;

    #[async_trait::async_trait]
    impl relaygate_packs::BuiltinPack for EchoPack {
        fn pack_id(&self) -> &str {
            "echo"
        }

        fn tools(&self) -> Vec<relaygate_packs::builtin::BuiltinToolDef> {
            vec![relaygate_packs::builtin::BuiltinToolDef {
                name: "echo".into(),
                description: "echoes input".into(),
                input_schema: serde_json::json!({}),
                timeout_ms: None,
            }]
        }

        async fn call(&self, _tool_name: &str, _agent_id: &PrincipalId, input: Value) -> (Option<Value>, Option<String>) {
            (Some(input), None)
        }
    }

    #[tokio::test]
    async fn tool_use_is_routed_and_result_injected_into_stream_and_ledger() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let agents = Arc::new(AgentRegistry::new());
        let packs = Arc::new(PackRegistry::new());
        packs.register_builtin(Arc::new(EchoPack)).unwrap();
        let tool_router = Arc::new(ToolRouter::new(packs));

        let agent_id = PrincipalId::new();
        let (outbound_tx, mut outbound_rx) = mpsc::channel(4);
        agents
            .register(agent_id.clone(), "agent".into(), vec![], None, None, outbound_tx)
            .unwrap();

        let service = ConversationService::new(store.clone(), agents.clone(), tool_router);
        let (request_id, thread_id, mut rx) = service
            .send(SendRequest {
                thread_id: None,
                frontend: "slack".into(),
                external_thread_id: "chan-3".into(),
                agent_id: agent_id.clone(),
                sender: "alice".into(),
                content: "run echo".into(),
                attachments: vec![],
            })
            .await
            .unwrap();
        let _sent = outbound_rx.recv().await.unwrap();

        agents.route_reply(
            &agent_id,
            &request_id,
            RawReplyEvent::ToolUse {
                tool_call_id: "call-1".into(),
                tool_name: "echo".into(),
                input: serde_json::json!({"x": 1}),
            },
        );
        // Give the spawned tool call time to complete before the agent
        // signals done, so the routed result isn't racing the terminal event.
        tokio::time::sleep(Duration::from_millis(20)).await;
        agents.route_reply(&agent_id, &request_id, RawReplyEvent::Done { full_response: Some("done".into()) });

        let mut saw_routed_result = false;
        while let Some(event) = rx.recv().await {
            if let TranslatedKind::ToolResult { tool_call_id, output, is_error } = &event.kind {
                assert_eq!(tool_call_id, "call-1");
                assert_eq!(*output, serde_json::json!({"x": 1}));
                assert!(!is_error);
                saw_routed_result = true;
            }
            if event.kind.is_terminal() {
                break;
            }
        }
        assert!(saw_routed_result, "routed tool result should appear in the caller's stream");

        tokio::time::sleep(Duration::from_millis(50)).await;
        let page = store.list_events_by_thread(&thread_id, None, None).unwrap();
        assert!(page
            .items
            .iter()
            .any(|e| matches!(e.event_type, EventType::ToolResult) && e.author == "call-1"));
    }
}
