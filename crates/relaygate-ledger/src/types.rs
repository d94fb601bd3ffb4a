use relaygate_core::ids::{BindingId, PrincipalId, PrincipalKind, PrincipalStatus, RoleName, ThreadId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub kind: PrincipalKind,
    pub fingerprint: Option<String>,
    pub display_name: String,
    pub status: PrincipalStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub subject_kind: PrincipalKind,
    pub subject_id: String,
    pub role_name: RoleName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub frontend: String,
    pub external_id: String,
    pub agent_id: PrincipalId,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub id: BindingId,
    pub frontend: String,
    pub channel_id: String,
    pub agent_principal_id: PrincipalId,
    pub agent_working_dir: Option<String>,
    pub created_at: String,
    pub creator_principal_id: PrincipalId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDirection {
    InboundToAgent,
    OutboundFromAgent,
}

impl std::fmt::Display for EventDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventDirection::InboundToAgent => write!(f, "inbound_to_agent"),
            EventDirection::OutboundFromAgent => write!(f, "outbound_from_agent"),
        }
    }
}

impl std::str::FromStr for EventDirection {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound_to_agent" => Ok(EventDirection::InboundToAgent),
            "outbound_from_agent" => Ok(EventDirection::OutboundFromAgent),
            other => Err(format!("unknown event direction: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Message,
    ToolCall,
    ToolResult,
    System,
    Error,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Message => write!(f, "message"),
            EventType::ToolCall => write!(f, "tool_call"),
            EventType::ToolResult => write!(f, "tool_result"),
            EventType::System => write!(f, "system"),
            EventType::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(EventType::Message),
            "tool_call" => Ok(EventType::ToolCall),
            "tool_result" => Ok(EventType::ToolResult),
            "system" => Ok(EventType::System),
            "error" => Ok(EventType::Error),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// A single row of the append-only ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: String,
    pub conversation_key: String,
    pub thread_id: Option<ThreadId>,
    pub direction: EventDirection,
    pub author: String,
    pub timestamp: String,
    pub event_type: EventType,
    pub text: Option<String>,
    pub raw_ref: Option<String>,
}

/// A new event awaiting an id/timestamp, built by the Conversation Service.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub conversation_key: String,
    pub thread_id: Option<ThreadId>,
    pub direction: EventDirection,
    pub author: String,
    pub event_type: EventType,
    pub text: Option<String>,
    pub raw_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub id: String,
    pub request_id: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub message_event_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub actor_principal_id: PrincipalId,
    pub action: String,
    pub details: String,
    pub created_at: String,
}

/// Opaque cursor over `(timestamp, id)`, per §4.1's paged reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MIN_PAGE_LIMIT: i64 = 1;
pub const MAX_PAGE_LIMIT: i64 = 500;

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(MIN_PAGE_LIMIT, MAX_PAGE_LIMIT)
}
