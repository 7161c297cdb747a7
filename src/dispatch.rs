//! Tool dispatcher: validates arguments and runs tools in isolation.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crate::tools::{ToolDescriptor, ToolRegistry};
use crate::types::{Error, ExecutionId, Result};

/// Body of a `use_tool` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionRequest {
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.registry.list()
    }

    /// Run one tool call. Tool failures and panics come back as
    /// [`Error::Execution`]; the caller's process is never taken down.
    pub async fn invoke(&self, request: ExecutionRequest) -> Result<Value> {
        let tool_name = request
            .tool_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| Error::bad_request("Missing tool_name or arguments."))?;
        let arguments = request
            .arguments
            .filter(|args| !args.is_null())
            .ok_or_else(|| Error::bad_request("Missing tool_name or arguments."))?;

        let entry = self
            .registry
            .get(&tool_name)
            .ok_or_else(|| Error::not_found(format!("Tool '{}' not found.", tool_name)))?;
        entry.validate(&arguments)?;

        let execution_id = ExecutionId::new();
        let started = Instant::now();
        tracing::info!("[{}] invoking {}", execution_id, tool_name);

        let outcome = AssertUnwindSafe(entry.tool().execute(arguments))
            .catch_unwind()
            .await;
        let elapsed_ms = started.elapsed().as_millis();

        match outcome {
            Ok(Ok(value)) => {
                tracing::info!("[{}] {} completed in {}ms", execution_id, tool_name, elapsed_ms);
                Ok(value)
            }
            Ok(Err(e @ Error::InvalidArguments { .. })) => {
                tracing::warn!("[{}] {} rejected arguments: {}", execution_id, tool_name, e);
                Err(e)
            }
            Ok(Err(e)) => {
                tracing::error!(
                    "[{}] {} failed after {}ms: {}",
                    execution_id,
                    tool_name,
                    elapsed_ms,
                    e
                );
                Err(Error::execution(tool_name, e.to_string()))
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool panicked".to_string());
                tracing::error!("[{}] {} panicked: {}", execution_id, tool_name, message);
                Err(Error::execution(tool_name, message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{OperationRegistry, QualityTool};
    use crate::types::Config;
    use serde_json::json;

    fn dispatcher() -> Dispatcher {
        let tools = QualityTool::default_set(
            &Config::default(),
            Arc::new(OperationRegistry::with_builtins()),
        );
        Dispatcher::new(Arc::new(ToolRegistry::from_tools(tools).unwrap()))
    }

    fn request(name: Option<&str>, arguments: Option<Value>) -> ExecutionRequest {
        ExecutionRequest {
            tool_name: name.map(str::to_string),
            arguments,
        }
    }

    #[tokio::test]
    async fn test_missing_fields_are_bad_requests() {
        let d = dispatcher();
        for req in [
            request(None, Some(json!({}))),
            request(Some(""), Some(json!({}))),
            request(Some("measurePerformance"), None),
            request(Some("measurePerformance"), Some(Value::Null)),
        ] {
            assert!(matches!(d.invoke(req).await.unwrap_err(), Error::BadRequest(_)));
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_found() {
        let err = dispatcher()
            .invoke(request(Some("nonexistent"), Some(json!({}))))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "not found: Tool 'nonexistent' not found.");
    }

    #[tokio::test]
    async fn test_schema_violation_is_invalid_arguments() {
        let err = dispatcher()
            .invoke(request(Some("measurePerformance"), Some(json!({"iterations": 0}))))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_successful_invocation_returns_envelope() {
        let value = dispatcher()
            .invoke(request(
                Some("measurePerformance"),
                Some(json!({"operationName": "noop", "targetComponent": "builtin", "iterations": 2})),
            ))
            .await
            .unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["metrics"]["successfulIterations"], 2);
    }

    #[test]
    fn test_list_tools_matches_registry() {
        let d = dispatcher();
        assert_eq!(d.list_tools().len(), d.registry().len());
    }
}
