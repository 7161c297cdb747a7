//! In-process operation registry.
//!
//! Operations are invocable units keyed by `component::operation`. The
//! profiler times them and the stability monitor uses them as health probes.
//! Lookup is an explicit table; nothing is loaded from the filesystem.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use crate::types::{Error, Result};

/// Component that hosts the operations shipped with the server.
pub const BUILTIN_COMPONENT: &str = "builtin";

/// One invocable operation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Operation: Send + Sync {
    async fn invoke(&self, payload: &Value) -> Result<Value>;
}

/// Registry key for `component::operation`.
pub fn operation_key(component: &str, operation: &str) -> String {
    format!("{}::{}", component, operation)
}

/// Table of operations keyed by `component::operation`.
#[derive(Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the `builtin` component.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(BUILTIN_COMPONENT, "noop", Arc::new(Noop));
        registry.register(BUILTIN_COMPONENT, "sleep", Arc::new(Sleep));
        registry.register(BUILTIN_COMPONENT, "checksum", Arc::new(Checksum));
        registry.register(BUILTIN_COMPONENT, "fail", Arc::new(Fail));
        registry
    }

    /// Register (or replace) an operation.
    pub fn register(&mut self, component: &str, operation: &str, op: Arc<dyn Operation>) {
        let key = operation_key(component, operation);
        if self.operations.insert(key.clone(), op).is_some() {
            tracing::warn!("operation '{}' replaced", key);
        }
    }

    /// Resolve `(component, operation)`.
    pub fn resolve(&self, component: &str, operation: &str) -> Result<Arc<dyn Operation>> {
        self.resolve_key(&operation_key(component, operation))
    }

    /// Resolve a `component::operation` key.
    pub fn resolve_key(&self, key: &str) -> Result<Arc<dyn Operation>> {
        self.operations
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("operation '{}' is not registered", key)))
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.operations.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.keys())
            .finish()
    }
}

// =============================================================================
// Built-in operations
// =============================================================================

#[derive(Debug)]
struct Noop;

#[async_trait]
impl Operation for Noop {
    async fn invoke(&self, _payload: &Value) -> Result<Value> {
        Ok(Value::Null)
    }
}

/// Sleeps for `payload.ms` milliseconds (default 0).
#[derive(Debug)]
struct Sleep;

#[async_trait]
impl Operation for Sleep {
    async fn invoke(&self, payload: &Value) -> Result<Value> {
        let ms = match payload.get("ms") {
            None | Some(Value::Null) => 0,
            Some(v) => v
                .as_u64()
                .ok_or_else(|| Error::validation("payload.ms must be a non-negative integer"))?,
        };
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(serde_json::json!({ "sleptMs": ms }))
    }
}

/// Hashes the canonical JSON encoding of the payload.
#[derive(Debug)]
struct Checksum;

#[async_trait]
impl Operation for Checksum {
    async fn invoke(&self, payload: &Value) -> Result<Value> {
        let encoded = serde_json::to_vec(payload)?;
        let mut hasher = DefaultHasher::new();
        encoded.hash(&mut hasher);
        Ok(serde_json::json!({
            "bytes": encoded.len(),
            "checksum": format!("{:016x}", hasher.finish()),
        }))
    }
}

#[derive(Debug)]
struct Fail;

#[async_trait]
impl Operation for Fail {
    async fn invoke(&self, _payload: &Value) -> Result<Value> {
        Err(Error::internal("builtin::fail always fails"))
    }
}
