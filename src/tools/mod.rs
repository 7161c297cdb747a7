//! Quality-assurance tools and the registry that exposes them.
//!
//! Every tool implements [`Tool`] with typed input/output; JSON schemas for
//! both sides are derived from those types. The set of tools is closed and
//! enumerated by [`QualityTool`].

pub mod catalog;
pub mod collector;
pub mod config_store;
pub mod operations;
pub mod performance;
pub mod report;
pub mod security;
pub mod stability;
pub mod test_suite;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::types::{Config, Error, Result};

pub use catalog::{ToolDescriptor, ToolRegistry};
pub use collector::DataCollector;
pub use config_store::ConfigStore;
pub use operations::{Operation, OperationRegistry};
pub use performance::PerformanceProfiler;
pub use report::ReportGenerator;
pub use security::SecurityScanner;
pub use stability::StabilityMonitor;
pub use test_suite::TestSuiteRunner;

// =============================================================================
// Tool trait
// =============================================================================

/// A named, schema-described unit of work.
#[async_trait]
pub trait Tool: Send + Sync {
    type Input: DeserializeOwned + JsonSchema + Send + 'static;
    type Output: Serialize + JsonSchema + Send;

    /// Registry key, also the `tool_name` callers send.
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    async fn run(&self, input: Self::Input) -> Result<Self::Output>;
}

/// Three-tier outcome shared by most tool envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Ran and the checked property holds.
    Success,
    /// Ran, but the checked property does not hold (tests failed...).
    Failure,
    /// Could not run as requested.
    Error,
}

/// Where a test or measurement runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Docker,
    #[default]
    Local,
}

// =============================================================================
// Closed tool set
// =============================================================================

/// Every tool the server knows about.
#[derive(Debug)]
pub enum QualityTool {
    ExecuteTestSuite(TestSuiteRunner),
    MeasurePerformance(PerformanceProfiler),
    MonitorStability(StabilityMonitor),
    ScanSecurity(SecurityScanner),
    ManageTestConfig(ConfigStore),
    CollectTestData(DataCollector),
    GenerateReport(ReportGenerator),
}

impl QualityTool {
    /// The default tool set, in registration order.
    pub fn default_set(config: &Config, operations: Arc<OperationRegistry>) -> Vec<QualityTool> {
        vec![
            QualityTool::ExecuteTestSuite(TestSuiteRunner::new(config.test_runner.clone())),
            QualityTool::MeasurePerformance(PerformanceProfiler::new(operations.clone())),
            QualityTool::MonitorStability(StabilityMonitor::new(
                config.stability.clone(),
                operations,
            )),
            QualityTool::ScanSecurity(SecurityScanner::new(config.security.clone())),
            QualityTool::ManageTestConfig(ConfigStore::new(config.storage.config_dir.clone())),
            QualityTool::CollectTestData(DataCollector::new()),
            QualityTool::GenerateReport(ReportGenerator::new(
                config.storage.reports_dir.clone(),
                config.storage.templates_dir.clone(),
            )),
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            QualityTool::ExecuteTestSuite(_) => TestSuiteRunner::NAME,
            QualityTool::MeasurePerformance(_) => PerformanceProfiler::NAME,
            QualityTool::MonitorStability(_) => StabilityMonitor::NAME,
            QualityTool::ScanSecurity(_) => SecurityScanner::NAME,
            QualityTool::ManageTestConfig(_) => ConfigStore::NAME,
            QualityTool::CollectTestData(_) => DataCollector::NAME,
            QualityTool::GenerateReport(_) => ReportGenerator::NAME,
        }
    }

    /// Public metadata; never includes the executable unit.
    pub fn describe(&self) -> ToolDescriptor {
        match self {
            QualityTool::ExecuteTestSuite(t) => describe(t),
            QualityTool::MeasurePerformance(t) => describe(t),
            QualityTool::MonitorStability(t) => describe(t),
            QualityTool::ScanSecurity(t) => describe(t),
            QualityTool::ManageTestConfig(t) => describe(t),
            QualityTool::CollectTestData(t) => describe(t),
            QualityTool::GenerateReport(t) => describe(t),
        }
    }

    /// Decode `arguments`, run the tool and encode its envelope.
    pub async fn execute(&self, arguments: Value) -> Result<Value> {
        match self {
            QualityTool::ExecuteTestSuite(t) => run_json(t, arguments).await,
            QualityTool::MeasurePerformance(t) => run_json(t, arguments).await,
            QualityTool::MonitorStability(t) => run_json(t, arguments).await,
            QualityTool::ScanSecurity(t) => run_json(t, arguments).await,
            QualityTool::ManageTestConfig(t) => run_json(t, arguments).await,
            QualityTool::CollectTestData(t) => run_json(t, arguments).await,
            QualityTool::GenerateReport(t) => run_json(t, arguments).await,
        }
    }
}

fn describe<T: Tool>(_tool: &T) -> ToolDescriptor {
    ToolDescriptor {
        name: T::NAME.to_string(),
        description: T::DESCRIPTION.to_string(),
        input_schema: schema_value::<T::Input>(),
        output_schema: schema_value::<T::Output>(),
    }
}

async fn run_json<T: Tool>(tool: &T, arguments: Value) -> Result<Value> {
    let input: T::Input = serde_json::from_value(arguments)
        .map_err(|e| Error::invalid_arguments(T::NAME, vec![e.to_string()]))?;
    let output = tool.run(input).await?;
    Ok(serde_json::to_value(output)?)
}

/// JSON Schema document for `T`.
pub fn schema_value<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema).unwrap_or_else(|e| {
        tracing::warn!("schema serialization failed: {}", e);
        Value::Bool(true)
    })
}
