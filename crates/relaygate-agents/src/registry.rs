use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;
use relaygate_core::ids::{PrincipalId, RequestId, ThreadId};
use relaygate_protocol::agent::{RawReplyEvent, SendMessage, Shutdown, TranslatedEvent, TranslatedKind};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

const RAW_CHANNEL_CAPACITY: usize = 16;
const TRANSLATED_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("agent not found: {0}")]
    NotFound(String),
    #[error("agent already registered: {0}")]
    AlreadyRegistered(String),
    #[error("dispatch channel full for agent {0}")]
    DispatchUnavailable(String),
}

/// Outbound frames the gateway's per-connection writer task drains and puts
/// on the wire, per §6's "gateway→agent frames".
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    SendMessage(SendMessage),
    Shutdown(Shutdown),
}

struct PendingRequest {
    raw_tx: mpsc::Sender<RawReplyEvent>,
}

/// One live agent connection. The network read/write loop lives in the
/// gateway crate; this struct only holds the state the registry needs to
/// dispatch and demultiplex.
pub struct AgentConnection {
    pub agent_id: PrincipalId,
    pub name: String,
    pub capabilities: Vec<String>,
    pub working_dir: Option<String>,
    pub instance_id: Option<String>,
    outbound: mpsc::Sender<OutboundFrame>,
    pending: Mutex<HashMap<RequestId, PendingRequest>>,
    dropped_replies: AtomicU64,
}

impl AgentConnection {
    pub fn dropped_replies(&self) -> u64 {
        self.dropped_replies.load(Ordering::Relaxed)
    }
}

pub struct DispatchRequest {
    pub target_agent_id: PrincipalId,
    pub thread_id: Option<ThreadId>,
    pub sender: String,
    pub content: String,
    pub attachments: Vec<Value>,
}

/// Owns live agent connections; sends per-request dispatch messages and
/// demuxes the reply stream by request-id (§4.3).
#[derive(Default)]
pub struct AgentRegistry {
    connections: DashMap<PrincipalId, std::sync::Arc<AgentConnection>>,
    by_instance: DashMap<String, PrincipalId>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly connected agent's outbound frame sender. Fails if
    /// the agent id already has a live connection — the old connection is
    /// not preempted.
    #[instrument(skip(self, outbound))]
    pub fn register(
        &self,
        agent_id: PrincipalId,
        name: String,
        capabilities: Vec<String>,
        working_dir: Option<String>,
        instance_id: Option<String>,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Result<(), RegistryError> {
        if self.connections.contains_key(&agent_id) {
            return Err(RegistryError::AlreadyRegistered(agent_id.to_string()));
        }

        if let Some(instance) = &instance_id {
            self.by_instance.insert(instance.clone(), agent_id.clone());
        }

        let conn = std::sync::Arc::new(AgentConnection {
            agent_id: agent_id.clone(),
            name,
            capabilities,
            working_dir,
            instance_id,
            outbound,
            pending: Mutex::new(HashMap::new()),
            dropped_replies: AtomicU64::new(0),
        });
        self.connections.insert(agent_id.clone(), conn);
        info!(%agent_id, "agent registered");
        Ok(())
    }

    /// Removes the connection and fails every pending request on it with a
    /// terminal `disconnected` error, per §7's "Agent/pack stream crashes
    /// deregister the party and convert any pending request into a
    /// `disconnected` error for its caller."
    #[instrument(skip(self))]
    pub fn deregister(&self, agent_id: &PrincipalId) {
        if let Some((_, conn)) = self.connections.remove(agent_id) {
            if let Some(instance) = &conn.instance_id {
                self.by_instance.remove(instance);
            }
            let mut pending = conn.pending.lock().unwrap();
            for (request_id, entry) in pending.drain() {
                let _ = entry.raw_tx.try_send(RawReplyEvent::Error {
                    message: "disconnected".to_string(),
                });
                drop(request_id);
            }
            info!(%agent_id, "agent deregistered");
        }
    }

    pub fn get(&self, agent_id: &PrincipalId) -> Option<std::sync::Arc<AgentConnection>> {
        self.connections.get(agent_id).map(|entry| entry.clone())
    }

    pub fn get_by_instance(&self, instance_id: &str) -> Option<std::sync::Arc<AgentConnection>> {
        let agent_id = self.by_instance.get(instance_id)?.clone();
        self.get(&agent_id)
    }

    pub fn get_by_principal_and_dir(
        &self,
        agent_id: &PrincipalId,
        working_dir: Option<&str>,
    ) -> Option<std::sync::Arc<AgentConnection>> {
        let conn = self.get(agent_id)?;
        if conn.working_dir.as_deref() == working_dir {
            Some(conn)
        } else {
            None
        }
    }

    pub fn is_online(&self, agent_id: &PrincipalId) -> bool {
        self.connections.contains_key(agent_id)
    }

    pub fn list(&self) -> Vec<std::sync::Arc<AgentConnection>> {
        self.connections.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Dispatches a message to the target agent and returns a channel of
    /// translated reply events, per §4.3's "Dispatch operation".
    #[instrument(skip(self, req))]
    pub async fn dispatch(
        &self,
        req: DispatchRequest,
    ) -> Result<(RequestId, mpsc::Receiver<TranslatedEvent>), RegistryError> {
        let conn = self
            .connections
            .get(&req.target_agent_id)
            .map(|e| e.clone())
            .ok_or_else(|| RegistryError::NotFound(req.target_agent_id.to_string()))?;

        let request_id = RequestId::new();
        let (raw_tx, mut raw_rx) = mpsc::channel::<RawReplyEvent>(RAW_CHANNEL_CAPACITY);
        let (translated_tx, translated_rx) = mpsc::channel::<TranslatedEvent>(TRANSLATED_CHANNEL_CAPACITY);

        conn.pending
            .lock()
            .unwrap()
            .insert(request_id.clone(), PendingRequest { raw_tx });

        let frame = OutboundFrame::SendMessage(SendMessage {
            request_id: request_id.to_string(),
            thread_id: req.thread_id.map(|t| t.to_string()),
            sender: req.sender,
            content: req.content,
            attachments: req.attachments,
        });
        conn.outbound
            .send(frame)
            .await
            .map_err(|_| RegistryError::DispatchUnavailable(req.target_agent_id.to_string()))?;

        let worker_conn = conn.clone();
        let worker_request_id = request_id.clone();
        tokio::spawn(async move {
            while let Some(raw) = raw_rx.recv().await {
                let kind: TranslatedKind = raw.into();
                let terminal = kind.is_terminal();
                let event = TranslatedEvent {
                    request_id: worker_request_id.to_string(),
                    kind,
                };
                if translated_tx.try_send(event).is_err() {
                    worker_conn.dropped_replies.fetch_add(1, Ordering::Relaxed);
                    warn!(request_id = %worker_request_id, "translated reply channel full, dropping newest");
                }
                if terminal {
                    break;
                }
            }
            worker_conn.pending.lock().unwrap().remove(&worker_request_id);
        });

        Ok((request_id, translated_rx))
    }

    /// Routes a raw reply event from an agent's stream to the pending
    /// request's translation worker. Per §4.3's "Correlation rules".
    #[instrument(skip(self, event))]
    pub fn route_reply(&self, agent_id: &PrincipalId, request_id: &RequestId, event: RawReplyEvent) {
        let Some(conn) = self.get(agent_id) else {
            warn!(%agent_id, "reply from unknown agent, dropping");
            return;
        };
        let raw_tx = {
            let pending = conn.pending.lock().unwrap();
            pending.get(request_id).map(|entry| entry.raw_tx.clone())
        };
        match raw_tx {
            Some(tx) => {
                if tx.try_send(event).is_err() {
                    conn.dropped_replies.fetch_add(1, Ordering::Relaxed);
                    warn!(%request_id, "raw reply channel full, dropping newest");
                }
            }
            None => warn!(%request_id, "reply for unknown request id, dropping"),
        }
    }

    /// Cancels a pending request: closes its raw channel, which ends the
    /// translation worker and deregisters the pending slot.
    pub fn cancel(&self, agent_id: &PrincipalId, request_id: &RequestId) {
        if let Some(conn) = self.get(agent_id) {
            conn.pending.lock().unwrap().remove(request_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_agent_id() -> PrincipalId {
        PrincipalId::new()
    }

    #[tokio::test]
    async fn register_rejects_duplicate_live_id() {
        let registry = AgentRegistry::new();
        let agent_id = test_agent_id();
        let (tx, _rx) = mpsc::channel(4);
        registry
            .register(agent_id.clone(), "a".into(), vec![], None, None, tx.clone())
            .unwrap();
        let result = registry.register(agent_id, "a".into(), vec![], None, None, tx);
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(_))));
    }

    #[tokio::test]
    async fn dispatch_to_unknown_agent_is_not_found() {
        let registry = AgentRegistry::new();
        let result = registry
            .dispatch(DispatchRequest {
                target_agent_id: test_agent_id(),
                thread_id: None,
                sender: "alice".into(),
                content: "hi".into(),
                attachments: vec![],
            })
            .await;
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn dispatch_and_route_reply_translates_events() {
        let registry = AgentRegistry::new();
        let agent_id = test_agent_id();
        let (outbound_tx, mut outbound_rx) = mpsc::channel(4);
        registry
            .register(agent_id.clone(), "a".into(), vec![], None, None, outbound_tx)
            .unwrap();

        let (request_id, mut rx) = registry
            .dispatch(DispatchRequest {
                target_agent_id: agent_id.clone(),
                thread_id: None,
                sender: "alice".into(),
                content: "hi".into(),
                attachments: vec![],
            })
            .await
            .unwrap();

        let sent = outbound_rx.recv().await.unwrap();
        match sent {
            OutboundFrame::SendMessage(msg) => assert_eq!(msg.request_id, request_id.to_string()),
            _ => panic!("expected SendMessage"),
        }

        registry.route_reply(
            &agent_id,
            &request_id,
            RawReplyEvent::Text { delta: "hello".into() },
        );
        registry.route_reply(&agent_id, &request_id, RawReplyEvent::Done { full_response: None });

        let first = rx.recv().await.unwrap();
        assert!(matches!(first.kind, TranslatedKind::Text { .. }));
        let second = rx.recv().await.unwrap();
        assert!(second.kind.is_terminal());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn deregister_fails_pending_requests() {
        let registry = AgentRegistry::new();
        let agent_id = test_agent_id();
        let (outbound_tx, _outbound_rx) = mpsc::channel(4);
        registry
            .register(agent_id.clone(), "a".into(), vec![], None, None, outbound_tx)
            .unwrap();

        let (_request_id, mut rx) = registry
            .dispatch(DispatchRequest {
                target_agent_id: agent_id.clone(),
                thread_id: None,
                sender: "alice".into(),
                content: "hi".into(),
                attachments: vec![],
            })
            .await
            .unwrap();

        registry.deregister(&agent_id);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event.kind, TranslatedKind::Error { .. }));
    }
}
