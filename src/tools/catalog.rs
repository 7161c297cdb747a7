//! Tool registry and argument validation.
//!
//! Owns every registered [`QualityTool`] for the process lifetime together with
//! a compiled validator for its input schema. Listing exposes metadata only.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::QualityTool;
use crate::types::{Error, Result};

// =============================================================================
// Descriptor
// =============================================================================

/// Public description of one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
}

// =============================================================================
// Registry entry
// =============================================================================

/// A registered tool plus its compiled input validator.
pub struct RegisteredTool {
    tool: QualityTool,
    descriptor: ToolDescriptor,
    validator: jsonschema::Validator,
}

impl RegisteredTool {
    fn new(tool: QualityTool) -> Result<Self> {
        let descriptor = tool.describe();
        let validator = jsonschema::validator_for(&descriptor.input_schema).map_err(|e| {
            Error::internal(format!(
                "input schema of '{}' does not compile: {}",
                descriptor.name, e
            ))
        })?;
        Ok(Self {
            tool,
            descriptor,
            validator,
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    pub fn tool(&self) -> &QualityTool {
        &self.tool
    }

    /// Validate arguments against the input schema.
    ///
    /// Returns every violation, formatted as `"<message> at <pointer>"`.
    pub fn validate(&self, arguments: &Value) -> Result<()> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(arguments)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{} at {}", e, path)
                }
            })
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::invalid_arguments(self.name(), violations))
        }
    }
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.descriptor.name)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Name-keyed tool registry that preserves registration order.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    entries: HashMap<String, Arc<RegisteredTool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from `tools`. Duplicates are logged and the first
    /// registration wins.
    pub fn from_tools(tools: impl IntoIterator<Item = QualityTool>) -> Result<Self> {
        let mut registry = Self::new();
        for tool in tools {
            match registry.register(tool) {
                Ok(()) => {}
                Err(Error::AlreadyExists(msg)) => {
                    tracing::warn!("skipping duplicate tool registration: {}", msg);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(registry)
    }

    /// Register a tool.
    pub fn register(&mut self, tool: QualityTool) -> Result<()> {
        let name = tool.name();
        if name.is_empty() {
            return Err(Error::validation("Tool name cannot be empty"));
        }
        if self.entries.contains_key(name) {
            return Err(Error::already_exists(format!("tool '{}'", name)));
        }
        let entry = RegisteredTool::new(tool)?;
        tracing::debug!("registered tool '{}'", name);
        self.order.push(name.to_string());
        self.entries.insert(name.to_string(), Arc::new(entry));
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<RegisteredTool>> {
        self.entries.get(name).cloned()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Descriptors in registration order.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ConfigStore, DataCollector, OperationRegistry};
    use crate::types::Config;
    use serde_json::json;

    fn default_registry() -> ToolRegistry {
        let tools =
            QualityTool::default_set(&Config::default(), Arc::new(OperationRegistry::with_builtins()));
        ToolRegistry::from_tools(tools).unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let registry = default_registry();
        assert_eq!(registry.len(), 7);
        assert!(registry.has_tool("scanSecurity"));
        assert!(!registry.has_tool("nonexistent"));
        assert_eq!(registry.get("generateReport").unwrap().name(), "generateReport");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ToolRegistry::new();
        registry
            .register(QualityTool::CollectTestData(DataCollector::new()))
            .unwrap();
        let err = registry
            .register(QualityTool::CollectTestData(DataCollector::new()))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_from_tools_keeps_first_duplicate() {
        let registry = ToolRegistry::from_tools(vec![
            QualityTool::ManageTestConfig(ConfigStore::new("first".into())),
            QualityTool::ManageTestConfig(ConfigStore::new("second".into())),
        ])
        .unwrap();
        assert_eq!(registry.len(), 1);
        match registry.get("manageTestConfig").unwrap().tool() {
            QualityTool::ManageTestConfig(store) => {
                assert_eq!(store.default_dir(), std::path::Path::new("first"))
            }
            other => panic!("unexpected tool {:?}", other),
        }
    }

    #[test]
    fn test_list_preserves_registration_order() {
        let registry = default_registry();
        let names: Vec<String> = registry.list().into_iter().map(|d| d.name).collect();
        assert_eq!(names.first().map(String::as_str), Some("executeTestSuite"));
        assert_eq!(names.last().map(String::as_str), Some("generateReport"));
    }

    #[test]
    fn test_validate_accepts_valid_arguments() {
        let registry = default_registry();
        let entry = registry.get("measurePerformance").unwrap();
        let args = json!({"operationName": "noop", "targetComponent": "builtin", "iterations": 3});
        assert!(entry.validate(&args).is_ok());
    }

    #[test]
    fn test_validate_reports_every_violation() {
        let registry = default_registry();
        let entry = registry.get("measurePerformance").unwrap();
        let args = json!({"iterations": 0, "environment": "cloud"});
        match entry.validate(&args).unwrap_err() {
            Error::InvalidArguments { tool, violations } => {
                assert_eq!(tool, "measurePerformance");
                // operationName, targetComponent, minimum, enum
                assert!(violations.len() >= 4, "{:?}", violations);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_validate_caps_iterations() {
        let registry = default_registry();
        let entry = registry.get("measurePerformance").unwrap();
        let at_cap = json!({"operationName": "noop", "targetComponent": "builtin", "iterations": 100000});
        assert!(entry.validate(&at_cap).is_ok());
        let huge = json!({"operationName": "noop", "targetComponent": "builtin", "iterations": 4294967295u64});
        assert!(matches!(
            entry.validate(&huge).unwrap_err(),
            Error::InvalidArguments { .. }
        ));
    }

    #[test]
    fn test_validate_rejects_wrong_types() {
        let registry = default_registry();
        let entry = registry.get("manageTestConfig").unwrap();
        assert!(entry.validate(&json!({"action": "explode"})).is_err());
        assert!(entry.validate(&json!({"action": "list"})).is_ok());
        assert!(entry.validate(&json!("list")).is_err());
    }
}
