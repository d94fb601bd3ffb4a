use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use relaygate_core::ids::{PrincipalId, RequestId};
use relaygate_protocol::pack::{ExecuteTool, ToolResult};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::warn;

use crate::registry::{PackRegistry, ToolOwner};

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("unknown tool: {0}")]
    NotFound(String),
    #[error("duplicate request id: {0}")]
    DuplicateRequestId(String),
    #[error("tool call timed out")]
    Timeout,
    #[error("pack disconnected")]
    Disconnected,
    #[error("tool error: {0}")]
    ToolError(String),
}

/// Correlates tool-call requests with tool-result replies across both
/// external packs and in-process built-ins, per §4.4.
pub struct ToolRouter {
    registry: Arc<PackRegistry>,
    pending: DashMap<RequestId, oneshot::Sender<ToolResult>>,
}

impl ToolRouter {
    pub fn new(registry: Arc<PackRegistry>) -> Self {
        Self {
            registry,
            pending: DashMap::new(),
        }
    }

    /// Executes `tool_name` for `agent_id`, returning its output JSON or a
    /// classified error.
    pub async fn call(
        &self,
        tool_name: &str,
        input: Value,
        request_id: RequestId,
        agent_id: &PrincipalId,
    ) -> Result<Value, ToolCallError> {
        if self.pending.contains_key(&request_id) {
            return Err(ToolCallError::DuplicateRequestId(request_id.to_string()));
        }

        let owner = self
            .registry
            .resolve(tool_name)
            .ok_or_else(|| ToolCallError::NotFound(tool_name.to_string()))?;

        let timeout = self
            .registry
            .tool_timeout_ms(tool_name)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TOOL_TIMEOUT);

        match owner {
            ToolOwner::Builtin(pack) => self.call_builtin(pack, tool_name, agent_id, input, timeout).await,
            ToolOwner::External(pack_id) => {
                self.call_external(&pack_id, tool_name, input, request_id, timeout).await
            }
        }
    }

    async fn call_builtin(
        &self,
        pack: Arc<dyn crate::builtin::BuiltinPack>,
        tool_name: &str,
        agent_id: &PrincipalId,
        input: Value,
        timeout: Duration,
    ) -> Result<Value, ToolCallError> {
        match tokio::time::timeout(timeout, pack.call(tool_name, agent_id, input)).await {
            Ok((Some(output), _)) => Ok(output),
            Ok((None, Some(error))) => Err(ToolCallError::ToolError(error)),
            Ok((None, None)) => Ok(Value::Null),
            Err(_) => Err(ToolCallError::Timeout),
        }
    }

    async fn call_external(
        &self,
        pack_id: &str,
        tool_name: &str,
        input: Value,
        request_id: RequestId,
        timeout: Duration,
    ) -> Result<Value, ToolCallError> {
        let conn = self.registry.get(pack_id).ok_or(ToolCallError::Disconnected)?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);

        let send_result = conn
            .dispatch
            .send(ExecuteTool {
                request_id: request_id.to_string(),
                tool_name: tool_name.to_string(),
                input_json: input,
            })
            .await;

        if send_result.is_err() {
            self.pending.remove(&request_id);
            return Err(ToolCallError::Disconnected);
        }

        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) if result.is_error() => {
                Err(ToolCallError::ToolError(result.error.unwrap_or_default()))
            }
            Ok(Ok(result)) => Ok(result.output_json.unwrap_or(Value::Null)),
            Ok(Err(_)) => Err(ToolCallError::Disconnected),
            Err(_) => Err(ToolCallError::Timeout),
        };

        self.pending.remove(&request_id);
        outcome
    }

    /// Routes an asynchronously arriving `ToolResult` from a pack's reply
    /// stream to its pending caller; unknown ids are dropped.
    pub fn route_result(&self, result: ToolResult) {
        let request_id = RequestId::from(result.request_id.clone());
        match self.pending.remove(&request_id) {
            Some((_, tx)) => {
                let _ = tx.send(result);
            }
            None => warn!(%request_id, "tool result for unknown request id, dropping"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{BuiltinPack, BuiltinToolDef};
    use async_trait::async_trait;

    struct EchoPack;

    #[async_trait]
    impl BuiltinPack for EchoPack {
        fn pack_id(&self) -> &str {
            "echo"
        }

        fn tools(&self) -> Vec<BuiltinToolDef> {
            vec![BuiltinToolDef {
                name: "echo".to_string(),
                description: "echoes input".to_string(),
                input_schema: serde_json::json!({}),
                timeout_ms: None,
            }]
        }

        async fn call(&self, _tool_name: &str, _agent_id: &PrincipalId, input: Value) -> (Option<Value>, Option<String>) {
            (Some(input), None)
        }
    }

    #[tokio::test]
    async fn builtin_tool_executes_synchronously() {
        let registry = Arc::new(PackRegistry::new());
        registry.register_builtin(Arc::new(EchoPack)).unwrap();
        let router = ToolRouter::new(registry);

        let output = router
            .call(
                "echo",
                serde_json::json!({"x": 1}),
                RequestId::new(),
                &PrincipalId::new(),
            )
            .await
            .unwrap();
        assert_eq!(output, serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = Arc::new(PackRegistry::new());
        let router = ToolRouter::new(registry);
        let result = router
            .call("missing", Value::Null, RequestId::new(), &PrincipalId::new())
            .await;
        assert!(matches!(result, Err(ToolCallError::NotFound(_))));
    }

    #[tokio::test]
    async fn duplicate_request_id_is_rejected() {
        let registry = Arc::new(PackRegistry::new());
        let (dispatch_tx, _dispatch_rx) = tokio::sync::mpsc::channel(4);
        registry
            .register_manifest(
                "pack-1".to_string(),
                "1.0".to_string(),
                vec![relaygate_protocol::pack::ToolDef {
                    name: "slow".to_string(),
                    description: "".to_string(),
                    input_schema: serde_json::json!({}),
                    required_capabilities: vec![],
                    timeout_ms: Some(50),
                }],
                dispatch_tx,
            )
            .unwrap();
        let router = Arc::new(ToolRouter::new(registry));
        let request_id = RequestId::new();

        let router2 = router.clone();
        let request_id2 = request_id.clone();
        let handle = tokio::spawn(async move {
            let _ = router2
                .call("slow", Value::Null, request_id2, &PrincipalId::new())
                .await;
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        let result = router
            .call("slow", Value::Null, request_id, &PrincipalId::new())
            .await;
        assert!(matches!(result, Err(ToolCallError::DuplicateRequestId(_))));
        let _ = handle.await;
    }
}
