use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Agent → gateway: first frame on the agent control stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Register {
    pub agent_id: String,
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub instance_id: Option<String>,
}

/// Gateway → agent: handshake acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Welcome {
    pub server_id: String,
    pub agent_id: String,
}

/// Gateway → agent: dispatch a message for the agent to act on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessage {
    pub request_id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub sender: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Value>,
}

/// Gateway → agent: ask the agent to terminate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shutdown {
    pub reason: String,
}

/// Agent → gateway: liveness ping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub ts_ms: i64,
}

/// Agent → gateway: one raw reply event for an in-flight request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub request_id: String,
    pub event: RawReplyEvent,
}

/// The raw variants an agent may emit for a dispatched request, per §4.3.
/// `Done`, `Error`, and `Canceled` are terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum RawReplyEvent {
    Thinking { text: String },
    Text { delta: String },
    ToolUse { tool_call_id: String, tool_name: String, input: Value },
    ToolResult { tool_call_id: String, output: Value, is_error: bool },
    File { name: String, mime_type: String, url: String },
    Done { full_response: Option<String> },
    Error { message: String },
    SessionInit { session_id: String },
    SessionOrphaned { session_id: String },
    Usage { input_tokens: u64, output_tokens: u64 },
    ToolState { tool_call_id: String, state: String },
    Canceled,
    ToolApprovalRequest { tool_call_id: String, tool_name: String, input: Value },
}

impl RawReplyEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RawReplyEvent::Done { .. } | RawReplyEvent::Error { .. } | RawReplyEvent::Canceled
        )
    }
}

/// The uniform internal shape every raw reply event is translated into
/// before being forwarded to a caller's channel, per §4.3's "re-emitted in
/// a uniform internal shape carrying the request-id."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatedEvent {
    pub request_id: String,
    pub kind: TranslatedKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranslatedKind {
    Thinking { text: String },
    Text { delta: String },
    ToolUse { tool_call_id: String, tool_name: String, input: Value },
    ToolResult { tool_call_id: String, output: Value, is_error: bool },
    File { name: String, mime_type: String, url: String },
    Done { full_response: Option<String> },
    Error { message: String },
    SessionInit { session_id: String },
    SessionOrphaned { session_id: String },
    Usage { input_tokens: u64, output_tokens: u64 },
    ToolState { tool_call_id: String, state: String },
    Canceled,
    ToolApprovalRequest { tool_call_id: String, tool_name: String, input: Value },
    /// Produced for a raw variant this build doesn't recognize — per §4.3,
    /// "an unknown variant produces a zero-valued event but does not close
    /// the stream."
    Unknown,
}

impl TranslatedKind {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TranslatedKind::Done { .. } | TranslatedKind::Error { .. } | TranslatedKind::Canceled
        )
    }
}

impl From<RawReplyEvent> for TranslatedKind {
    fn from(raw: RawReplyEvent) -> Self {
        match raw {
            RawReplyEvent::Thinking { text } => TranslatedKind::Thinking { text },
            RawReplyEvent::Text { delta } => TranslatedKind::Text { delta },
            RawReplyEvent::ToolUse { tool_call_id, tool_name, input } => {
                TranslatedKind::ToolUse { tool_call_id, tool_name, input }
            }
            RawReplyEvent::ToolResult { tool_call_id, output, is_error } => {
                TranslatedKind::ToolResult { tool_call_id, output, is_error }
            }
            RawReplyEvent::File { name, mime_type, url } => {
                TranslatedKind::File { name, mime_type, url }
            }
            RawReplyEvent::Done { full_response } => TranslatedKind::Done { full_response },
            RawReplyEvent::Error { message } => TranslatedKind::Error { message },
            RawReplyEvent::SessionInit { session_id } => TranslatedKind::SessionInit { session_id },
            RawReplyEvent::SessionOrphaned { session_id } => {
                TranslatedKind::SessionOrphaned { session_id }
            }
            RawReplyEvent::Usage { input_tokens, output_tokens } => {
                TranslatedKind::Usage { input_tokens, output_tokens }
            }
            RawReplyEvent::ToolState { tool_call_id, state } => {
                TranslatedKind::ToolState { tool_call_id, state }
            }
            RawReplyEvent::Canceled => TranslatedKind::Canceled,
            RawReplyEvent::ToolApprovalRequest { tool_call_id, tool_name, input } => {
                TranslatedKind::ToolApprovalRequest { tool_call_id, tool_name, input }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_and_error_and_canceled_are_terminal() {
        assert!(RawReplyEvent::Done { full_response: None }.is_terminal());
        assert!(RawReplyEvent::Error { message: "x".into() }.is_terminal());
        assert!(RawReplyEvent::Canceled.is_terminal());
        assert!(!RawReplyEvent::Text { delta: "x".into() }.is_terminal());
    }

    #[test]
    fn translation_preserves_request_shape() {
        let translated: TranslatedKind = RawReplyEvent::Text { delta: "hi".into() }.into();
        match translated {
            TranslatedKind::Text { delta } => assert_eq!(delta, "hi"),
            _ => panic!("wrong variant"),
        }
    }
}
