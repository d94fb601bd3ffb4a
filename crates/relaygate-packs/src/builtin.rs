use async_trait::async_trait;
use relaygate_core::ids::PrincipalId;
use serde_json::Value;

/// A tool definition offered by an in-process pack, sharing the global
/// tool-name namespace with external packs per §4.4 "Built-in packs".
pub struct BuiltinToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub timeout_ms: Option<u64>,
}

/// A pack registered purely in-process: its tools run via a handler
/// function the router invokes directly rather than over a dispatch
/// channel.
#[async_trait]
pub trait BuiltinPack: Send + Sync {
    fn pack_id(&self) -> &str;
    fn tools(&self) -> Vec<BuiltinToolDef>;

    /// Executes `tool_name` for `agent_id`, returning either output JSON or
    /// an error message — the `(output, error)` contract of §4.4.
    async fn call(&self, tool_name: &str, agent_id: &PrincipalId, input: Value) -> (Option<Value>, Option<String>);
}
