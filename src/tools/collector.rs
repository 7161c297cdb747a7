//! `collectTestData`: gather payloads from several sources and aggregate
//! them. Each source fails on its own; the rest are still processed.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use super::Tool;
use crate::types::{Error, Result};

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Json,
    Text,
}

/// One place to collect from. Sources arrive as raw JSON and are decoded
/// one at a time so a malformed entry only fails itself.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSource {
    File {
        path: PathBuf,
        format: FileFormat,
        #[serde(default)]
        id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    McpToolOutput {
        tool_name: String,
        execution_id: String,
        #[serde(default)]
        id: Option<String>,
    },
}

impl DataSource {
    fn source_id(&self) -> String {
        match self {
            DataSource::File { id: Some(id), .. } | DataSource::McpToolOutput { id: Some(id), .. } => {
                id.clone()
            }
            DataSource::File { path, .. } => path.display().to_string(),
            DataSource::McpToolOutput { tool_name, .. } => format!("mcp_tool_output:{}", tool_name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    Merge,
    #[default]
    List,
    /// Behaves like `list` for now.
    SummaryOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    JsonArray,
    SingleJsonObject,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CollectTestDataInput {
    /// `{type: "file", path, format, id?}` or
    /// `{type: "mcp_tool_output", toolName, executionId, id?}`.
    pub sources: Vec<Value>,
    #[serde(default)]
    pub aggregation_strategy: AggregationStrategy,
    #[serde(default)]
    pub output_format: Option<OutputFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Success,
    PartialSuccess,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CollectionError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMetadata {
    pub total_sources: usize,
    pub processed_sources: usize,
    pub failed_sources: usize,
    pub errors: Vec<CollectionError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CollectTestDataOutput {
    pub status: CollectionStatus,
    pub data: Value,
    pub metadata: CollectionMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// =============================================================================
// Collection
// =============================================================================

struct Collected {
    source_id: String,
    data: Value,
}

#[derive(Debug, Default)]
pub struct DataCollector;

impl DataCollector {
    pub fn new() -> Self {
        Self
    }

    async fn collect(&self, index: usize, raw: Value) -> std::result::Result<Collected, CollectionError> {
        let fallback_id = raw
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("source_{}", index));

        let source: DataSource = serde_json::from_value(raw).map_err(|e| CollectionError {
            source_id: Some(fallback_id.clone()),
            message: format!("Source '{}' is malformed: {}", fallback_id, e),
            details: None,
        })?;
        let source_id = source.source_id();

        let data = match &source {
            DataSource::File { path, format, .. } => {
                read_source_file(path, *format).await.map_err(|e| CollectionError {
                    source_id: Some(source_id.clone()),
                    message: format!("Source '{}' failed: {}", source_id, e),
                    details: Some(Value::String(path.display().to_string())),
                })?
            }
            DataSource::McpToolOutput {
                tool_name,
                execution_id,
                ..
            } => {
                tracing::warn!(
                    "collecting output of {} execution {} is not implemented",
                    tool_name,
                    execution_id
                );
                return Err(CollectionError {
                    source_id: Some(source_id.clone()),
                    message: format!(
                        "Source '{}' failed: collecting tool output ({}) is not implemented yet",
                        source_id, tool_name
                    ),
                    details: Some(serde_json::json!({ "executionId": execution_id })),
                });
            }
        };
        Ok(Collected { source_id, data })
    }
}

async fn read_source_file(path: &Path, format: FileFormat) -> Result<Value> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::validation(format!("cannot read {}: {}", path.display(), e))
    })?;
    match format {
        FileFormat::Json => Ok(serde_json::from_str(&content)?),
        FileFormat::Text => Ok(Value::String(content)),
    }
}

/// Combine collected payloads under `strategy`, then coerce to `format`.
fn aggregate(items: Vec<Collected>, strategy: AggregationStrategy, format: OutputFormat) -> Value {
    match strategy {
        AggregationStrategy::Merge => {
            let mut merged = Map::new();
            for item in items {
                match item.data {
                    Value::Object(map) => merged.extend(map),
                    other => {
                        tracing::warn!(
                            "data from '{}' is not an object, stored under its source id",
                            item.source_id
                        );
                        merged.insert(item.source_id, other);
                    }
                }
            }
            match format {
                OutputFormat::SingleJsonObject => Value::Object(merged),
                OutputFormat::JsonArray => Value::Array(vec![Value::Object(merged)]),
            }
        }
        AggregationStrategy::List | AggregationStrategy::SummaryOnly => {
            if strategy == AggregationStrategy::SummaryOnly {
                tracing::warn!("aggregation strategy 'summary_only' behaves like 'list'");
            }
            match format {
                OutputFormat::JsonArray => Value::Array(items.into_iter().map(|i| i.data).collect()),
                OutputFormat::SingleJsonObject => Value::Object(
                    items.into_iter().map(|i| (i.source_id, i.data)).collect(),
                ),
            }
        }
    }
}

fn status_for(metadata: &CollectionMetadata) -> CollectionStatus {
    if metadata.failed_sources == 0 && metadata.processed_sources == metadata.total_sources {
        CollectionStatus::Success
    } else if metadata.processed_sources > 0 {
        CollectionStatus::PartialSuccess
    } else {
        CollectionStatus::Failure
    }
}

#[async_trait]
impl Tool for DataCollector {
    type Input = CollectTestDataInput;
    type Output = CollectTestDataOutput;

    const NAME: &'static str = "collectTestData";
    const DESCRIPTION: &'static str =
        "Collects test data from files or earlier tool outputs and aggregates it.";

    async fn run(&self, input: Self::Input) -> Result<Self::Output> {
        let strategy = input.aggregation_strategy;
        tracing::info!(
            "collectTestData sources={} strategy={:?}",
            input.sources.len(),
            strategy
        );

        let mut metadata = CollectionMetadata {
            total_sources: input.sources.len(),
            ..CollectionMetadata::default()
        };
        let mut collected = Vec::new();
        for (index, raw) in input.sources.into_iter().enumerate() {
            match self.collect(index, raw).await {
                Ok(item) => {
                    metadata.processed_sources += 1;
                    collected.push(item);
                }
                Err(error) => {
                    tracing::error!("{}", error.message);
                    metadata.failed_sources += 1;
                    metadata.errors.push(error);
                }
            }
        }

        let format = input.output_format.unwrap_or(match strategy {
            AggregationStrategy::Merge => OutputFormat::SingleJsonObject,
            _ => OutputFormat::JsonArray,
        });
        let data = aggregate(collected, strategy, format);

        let status = status_for(&metadata);
        let message = match status {
            CollectionStatus::Success => "All data collected and aggregated.",
            CollectionStatus::PartialSuccess => "Data partially collected. See metadata for errors.",
            CollectionStatus::Failure => "Data collection failed. See metadata.",
        };
        Ok(CollectTestDataOutput {
            status,
            data,
            metadata,
            message: Some(message.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn input(sources: Vec<Value>, strategy: AggregationStrategy) -> CollectTestDataInput {
        CollectTestDataInput {
            sources,
            aggregation_strategy: strategy,
            output_format: None,
        }
    }

    #[tokio::test]
    async fn test_all_sources_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, r#"{"passed": 3}"#).unwrap();
        std::fs::write(&b, "plain log").unwrap();

        let output = DataCollector::new()
            .run(input(
                vec![
                    json!({"type": "file", "path": a, "format": "json"}),
                    json!({"type": "file", "path": b, "format": "text", "id": "log"}),
                ],
                AggregationStrategy::List,
            ))
            .await
            .unwrap();
        assert_eq!(output.status, CollectionStatus::Success);
        assert_eq!(output.metadata.failed_sources, 0);
        assert_eq!(output.data, json!([{"passed": 3}, "plain log"]));
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        std::fs::write(&good, r#"{"ok": true}"#).unwrap();

        let output = DataCollector::new()
            .run(input(
                vec![
                    json!({"type": "file", "path": good, "format": "json"}),
                    json!({"type": "file", "path": dir.path().join("missing.json"), "format": "json"}),
                    json!({"type": "mcp_tool_output", "toolName": "executeTestSuite", "executionId": "exec-1"}),
                    json!({"type": "carrier_pigeon", "id": "bird"}),
                ],
                AggregationStrategy::List,
            ))
            .await
            .unwrap();
        let meta = &output.metadata;
        assert_eq!(output.status, CollectionStatus::PartialSuccess);
        assert_eq!(meta.processed_sources + meta.failed_sources, meta.total_sources);
        assert_eq!(meta.failed_sources, 3);
        assert_eq!(meta.errors[1].source_id.as_deref(), Some("mcp_tool_output:executeTestSuite"));
        assert_eq!(meta.errors[2].source_id.as_deref(), Some("bird"));
    }

    #[tokio::test]
    async fn test_no_successful_source_is_failure() {
        let output = DataCollector::new()
            .run(input(vec![json!({"type": "file"})], AggregationStrategy::Merge))
            .await
            .unwrap();
        assert_eq!(output.status, CollectionStatus::Failure);
        assert_eq!(output.data, json!({}));
    }

    #[test]
    fn test_merge_keys_non_objects_by_source() {
        let items = vec![
            Collected { source_id: "a".into(), data: json!({"x": 1, "y": 1}) },
            Collected { source_id: "b".into(), data: json!({"y": 2}) },
            Collected { source_id: "c".into(), data: json!([1, 2]) },
        ];
        let merged = aggregate(items, AggregationStrategy::Merge, OutputFormat::SingleJsonObject);
        assert_eq!(merged, json!({"x": 1, "y": 2, "c": [1, 2]}));
    }

    #[test]
    fn test_output_format_coercion() {
        let items = || {
            vec![
                Collected { source_id: "a".into(), data: json!(1) },
                Collected { source_id: "b".into(), data: json!(2) },
            ]
        };
        assert_eq!(
            aggregate(items(), AggregationStrategy::List, OutputFormat::SingleJsonObject),
            json!({"a": 1, "b": 2})
        );
        assert_eq!(
            aggregate(items(), AggregationStrategy::Merge, OutputFormat::JsonArray),
            json!([{"a": 1, "b": 2}])
        );
        assert_eq!(
            aggregate(items(), AggregationStrategy::SummaryOnly, OutputFormat::JsonArray),
            json!([1, 2])
        );
    }

    #[tokio::test]
    async fn test_empty_sources_succeed() {
        let output = DataCollector::new()
            .run(input(vec![], AggregationStrategy::List))
            .await
            .unwrap();
        assert_eq!(output.status, CollectionStatus::Success);
        assert_eq!(output.data, json!([]));
    }
}
