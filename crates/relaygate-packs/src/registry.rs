use std::sync::Arc;

use dashmap::DashMap;
use relaygate_protocol::pack::{ExecuteTool, ToolDef};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

use crate::builtin::BuiltinPack;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool name already registered: {0}")]
    ToolCollision(String),
    #[error("pack not found: {0}")]
    NotFound(String),
}

/// Where a registered tool name resolves to.
#[derive(Clone)]
pub enum ToolOwner {
    External(String),
    Builtin(Arc<dyn BuiltinPack>),
}

pub struct PackConnection {
    pub pack_id: String,
    pub version: String,
    pub tools: Vec<ToolDef>,
    pub dispatch: mpsc::Sender<ExecuteTool>,
}

/// Owns live tool-pack connections and the global tool-name → pack index,
/// per §4.4.
#[derive(Default)]
pub struct PackRegistry {
    packs: DashMap<String, Arc<PackConnection>>,
    tool_index: DashMap<String, ToolOwner>,
}

impl PackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a built-in pack's tools into the shared namespace at
    /// startup. Collisions are a configuration error, not a runtime one.
    pub fn register_builtin(&self, pack: Arc<dyn BuiltinPack>) -> Result<(), RegistryError> {
        for tool in pack.tools() {
            if self.tool_index.contains_key(&tool.name) {
                return Err(RegistryError::ToolCollision(tool.name));
            }
        }
        for tool in pack.tools() {
            self.tool_index.insert(tool.name, ToolOwner::Builtin(pack.clone()));
        }
        Ok(())
    }

    /// Registers an external pack's manifest, rejecting it wholesale if any
    /// tool name collides with an already-registered tool.
    pub fn register_manifest(
        &self,
        pack_id: String,
        version: String,
        tools: Vec<ToolDef>,
        dispatch: mpsc::Sender<ExecuteTool>,
    ) -> Result<(), RegistryError> {
        for tool in &tools {
            if self.tool_index.contains_key(&tool.name) {
                return Err(RegistryError::ToolCollision(tool.name.clone()));
            }
        }

        let conn = Arc::new(PackConnection {
            pack_id: pack_id.clone(),
            version,
            tools: tools.clone(),
            dispatch,
        });
        self.packs.insert(pack_id.clone(), conn);
        for tool in tools {
            self.tool_index.insert(tool.name, ToolOwner::External(pack_id.clone()));
        }
        info!(%pack_id, "pack registered");
        Ok(())
    }

    /// Atomically removes a pack and all its tools, per §4.4's "when the
    /// pack stream ends...".
    pub fn deregister(&self, pack_id: &str) {
        if let Some((_, conn)) = self.packs.remove(pack_id) {
            self.tool_index.retain(|_, owner| !matches!(owner, ToolOwner::External(id) if id == pack_id));
            info!(%pack_id, tools = conn.tools.len(), "pack deregistered");
        }
    }

    pub fn resolve(&self, tool_name: &str) -> Option<ToolOwner> {
        self.tool_index.get(tool_name).map(|entry| entry.clone())
    }

    pub fn get(&self, pack_id: &str) -> Option<Arc<PackConnection>> {
        self.packs.get(pack_id).map(|entry| entry.clone())
    }

    pub fn tool_timeout_ms(&self, tool_name: &str) -> Option<u64> {
        match self.tool_index.get(tool_name)?.value() {
            ToolOwner::External(pack_id) => self
                .packs
                .get(pack_id)
                .and_then(|conn| conn.tools.iter().find(|t| t.name == tool_name).and_then(|t| t.timeout_ms)),
            ToolOwner::Builtin(pack) => pack
                .tools()
                .into_iter()
                .find(|t| t.name == tool_name)
                .and_then(|t| t.timeout_ms),
        }
    }
}
