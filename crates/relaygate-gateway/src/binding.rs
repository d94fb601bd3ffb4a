use std::sync::Arc;

use relaygate_agents::AgentRegistry;
use relaygate_core::ids::PrincipalId;
use relaygate_core::ErrorKind;
use relaygate_ledger::{Binding, LedgerError, Store};
use thiserror::Error;

/// Composes the ledger's binding table with the agent registry's
/// instance-id index to resolve a (frontend, channel) pair to a live
/// agent, per §5.6.
pub struct BindingResolver {
    store: Arc<Store>,
    agents: Arc<AgentRegistry>,
}

pub enum BindResult {
    Created(Binding),
    Rebound { binding: Binding, previous_agent_id: PrincipalId },
}

#[derive(Debug, Error)]
pub enum BindingError {
    #[error("no live agent connection for instance {0}")]
    AgentNotFound(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl BindingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BindingError::AgentNotFound(_) => ErrorKind::NotFound,
            BindingError::Ledger(err) => err.kind(),
        }
    }
}

impl BindingResolver {
    pub fn new(store: Arc<Store>, agents: Arc<AgentRegistry>) -> Self {
        Self { store, agents }
    }

    pub fn get(&self, frontend: &str, channel_id: &str) -> Result<Option<Binding>, LedgerError> {
        self.store.get_binding(frontend, channel_id)
    }

    /// Binds `channel_id` on `frontend` to the agent currently connected
    /// under `instance_id`, per §4.6: a chat command supplies an instance
    /// id, the resolver looks up the live agent by instance id, extracts
    /// (principal id, working directory), and writes the binding. Rebinding
    /// to the same identity is a no-op write that returns `Created` again
    /// (idempotent); rebinding to a different agent reports the previous
    /// owner so callers can log "rebound from X".
    pub fn bind(
        &self,
        frontend: &str,
        channel_id: &str,
        instance_id: &str,
        creator_principal_id: &PrincipalId,
    ) -> Result<BindResult, BindingError> {
        let conn = self
            .agents
            .get_by_instance(instance_id)
            .ok_or_else(|| BindingError::AgentNotFound(instance_id.to_string()))?;

        let previous = self.store.get_binding(frontend, channel_id)?;
        let binding = self.store.upsert_binding(
            frontend,
            channel_id,
            &conn.agent_id,
            conn.working_dir.as_deref(),
            creator_principal_id,
        )?;

        match previous {
            Some(prev) if prev.agent_principal_id != conn.agent_id => Ok(BindResult::Rebound {
                binding,
                previous_agent_id: prev.agent_principal_id,
            }),
            _ => Ok(BindResult::Created(binding)),
        }
    }

    pub fn unbind(&self, frontend: &str, channel_id: &str) -> Result<(), LedgerError> {
        self.store.delete_binding(frontend, channel_id)
    }

    pub fn list(&self) -> Result<Vec<Binding>, LedgerError> {
        self.store.list_bindings()
    }

    /// Whether the bound agent for this channel currently has a live
    /// connection at the same working directory it was bound against. A
    /// binding with no recorded working directory only checks liveness.
    pub fn is_agent_online(&self, binding: &Binding) -> bool {
        match &binding.agent_working_dir {
            Some(_) => self
                .agents
                .get_by_principal_and_dir(&binding.agent_principal_id, binding.agent_working_dir.as_deref())
                .is_some(),
            None => self.agents.is_online(&binding.agent_principal_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(agents: &AgentRegistry, instance_id: &str) -> PrincipalId {
        let agent_id = PrincipalId::new();
        let (tx, _rx) = tokio::sync::mpsc::channel(4);
        agents
            .register(agent_id.clone(), "agent".into(), vec![], None, Some(instance_id.to_string()), tx)
            .unwrap();
        agent_id
    }

    #[tokio::test]
    async fn bind_resolves_agent_from_instance_id() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let agents = Arc::new(AgentRegistry::new());
        let agent_id = register(&agents, "inst-1");
        let resolver = BindingResolver::new(store, agents);
        let creator = PrincipalId::new();

        let result = resolver.bind("slack", "chan-1", "inst-1", &creator).unwrap();
        match result {
            BindResult::Created(binding) => assert_eq!(binding.agent_principal_id, agent_id),
            BindResult::Rebound { .. } => panic!("expected fresh binding"),
        }
    }

    #[tokio::test]
    async fn bind_fails_for_unknown_instance_id() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let agents = Arc::new(AgentRegistry::new());
        let resolver = BindingResolver::new(store, agents);
        let creator = PrincipalId::new();

        let result = resolver.bind("slack", "chan-1", "no-such-instance", &creator);
        assert!(matches!(result, Err(BindingError::AgentNotFound(_))));
    }

    #[tokio::test]
    async fn rebind_to_different_agent_reports_previous_owner() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let agents = Arc::new(AgentRegistry::new());
        let agent1 = register(&agents, "inst-1");
        register(&agents, "inst-2");
        let resolver = BindingResolver::new(store, agents);
        let creator = PrincipalId::new();

        resolver.bind("slack", "chan-1", "inst-1", &creator).unwrap();
        let result = resolver.bind("slack", "chan-1", "inst-2", &creator).unwrap();
        match result {
            BindResult::Rebound { previous_agent_id, .. } => assert_eq!(previous_agent_id, agent1),
            BindResult::Created(_) => panic!("expected rebind"),
        }
    }

    #[tokio::test]
    async fn rebind_to_same_agent_is_idempotent() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let agents = Arc::new(AgentRegistry::new());
        register(&agents, "inst-1");
        let resolver = BindingResolver::new(store, agents);
        let creator = PrincipalId::new();

        resolver.bind("slack", "chan-1", "inst-1", &creator).unwrap();
        let result = resolver.bind("slack", "chan-1", "inst-1", &creator).unwrap();
        assert!(matches!(result, BindResult::Created(_)));
    }

    #[tokio::test]
    async fn is_agent_online_checks_working_dir_match_when_recorded() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let agents = Arc::new(AgentRegistry::new());
        let agent_id = PrincipalId::new();
        let (tx, _rx) = tokio::sync::mpsc::channel(4);
        agents
            .register(agent_id.clone(), "agent".into(), vec![], Some("/work/a".into()), Some("inst-1".into()), tx)
            .unwrap();
        let resolver = BindingResolver::new(store.clone(), agents);
        let creator = PrincipalId::new();

        resolver.bind("slack", "chan-1", "inst-1", &creator).unwrap();
        let binding = store.get_binding("slack", "chan-1").unwrap().unwrap();
        assert!(resolver.is_agent_online(&binding));

        let mismatched = Binding { agent_working_dir: Some("/work/b".into()), ..binding };
        assert!(!resolver.is_agent_online(&mismatched));
    }
}
