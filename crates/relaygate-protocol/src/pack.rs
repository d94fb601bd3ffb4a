use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pack → gateway: first frame on the pack control stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub pack_id: String,
    pub version: String,
    pub tools: Vec<ToolDef>,
}

/// A single callable tool offered by a pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Gateway → pack: invoke a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteTool {
    pub request_id: String,
    pub tool_name: String,
    pub input_json: Value,
}

/// Pack → gateway: the result of a previously dispatched `ExecuteTool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_json: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
