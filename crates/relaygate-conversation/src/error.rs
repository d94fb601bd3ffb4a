use relaygate_agents::RegistryError as AgentRegistryError;
use relaygate_core::{ErrorKind, RelaygateError};
use relaygate_ledger::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("agent unavailable: {0}")]
    AgentUnavailable(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ConversationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversationError::AgentNotFound(_) => ErrorKind::NotFound,
            ConversationError::AgentUnavailable(_) => ErrorKind::Unavailable,
            ConversationError::Ledger(err) => err.kind(),
        }
    }
}

impl From<AgentRegistryError> for ConversationError {
    fn from(err: AgentRegistryError) -> Self {
        match err {
            AgentRegistryError::NotFound(id) => ConversationError::AgentNotFound(id),
            AgentRegistryError::AlreadyRegistered(id) => ConversationError::AgentUnavailable(id),
            AgentRegistryError::DispatchUnavailable(id) => ConversationError::AgentUnavailable(id),
        }
    }
}

impl From<ConversationError> for RelaygateError {
    fn from(err: ConversationError) -> Self {
        match err.kind() {
            ErrorKind::NotFound => RelaygateError::not_found(err.to_string()),
            ErrorKind::Unavailable => RelaygateError::unavailable(err.to_string()),
            _ => RelaygateError::internal(err.to_string()),
        }
    }
}
