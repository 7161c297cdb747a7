//! End-to-end tool scenarios through the dispatcher.

use pretty_assertions::assert_eq;
use quality_guard::dispatch::{Dispatcher, ExecutionRequest};
use quality_guard::tools::{OperationRegistry, QualityTool, ToolRegistry};
use quality_guard::Config;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

fn dispatcher(root: &Path) -> Dispatcher {
    let mut config = Config::default();
    config.storage.config_dir = root.join("configs");
    config.storage.reports_dir = root.join("reports");
    config.storage.templates_dir = root.join("templates");
    let operations = Arc::new(OperationRegistry::with_builtins());
    let registry = ToolRegistry::from_tools(QualityTool::default_set(&config, operations)).unwrap();
    Dispatcher::new(Arc::new(registry))
}

async fn call(d: &Dispatcher, tool: &str, arguments: Value) -> Value {
    d.invoke(ExecutionRequest {
        tool_name: Some(tool.to_string()),
        arguments: Some(arguments),
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_collect_then_report() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results.json");
    std::fs::write(&results, r#"{"passed": 10, "failed": 1}"#).unwrap();
    let d = dispatcher(dir.path());

    let collected = call(
        &d,
        "collectTestData",
        json!({
            "sources": [
                {"type": "file", "path": results, "format": "json", "id": "unit"},
                {"type": "mcp_tool_output", "toolName": "executeTestSuite", "executionId": "exec-1"},
            ],
            "aggregationStrategy": "merge",
        }),
    )
    .await;
    assert_eq!(collected["status"], "partial_success");
    assert_eq!(collected["data"], json!({"passed": 10, "failed": 1}));

    let report = call(
        &d,
        "generateReport",
        json!({"inputData": collected, "reportType": "summary", "outputFileName": "ci"}),
    )
    .await;
    assert_eq!(report["status"], "success");
    let body = std::fs::read_to_string(dir.path().join("reports/ci.md")).unwrap();
    assert!(body.contains("- Processed sources: 1"));
    assert!(body.contains("- Failed sources: 1"));
    assert_eq!(report["reportMetadata"]["fileSizeBytes"], body.len());
}

#[tokio::test]
async fn test_profiler_always_failing_operation() {
    let dir = tempfile::tempdir().unwrap();
    let output = call(
        &dispatcher(dir.path()),
        "measurePerformance",
        json!({"operationName": "fail", "targetComponent": "builtin", "iterations": 5}),
    )
    .await;
    assert_eq!(output["status"], "failure");
    assert_eq!(output["metrics"]["successfulIterations"], 0);
    assert_eq!(output["metrics"]["failedIterations"], 5);
    assert_eq!(output["metrics"]["errorDetails"].as_array().unwrap().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_stability_healthy_operation() {
    let dir = tempfile::tempdir().unwrap();
    let output = call(
        &dispatcher(dir.path()),
        "monitorStability",
        json!({"targetComponent": "builtin::noop", "duration": "10s", "checkInterval": "5s"}),
    )
    .await;
    let report = &output["stabilityReport"];
    assert_eq!(output["status"], "success");
    assert_eq!(report["totalChecks"], 2);
    assert_eq!(report["finalStatus"], "stable");
    assert_eq!(report["uptimePercentage"], 100.0);
}

#[tokio::test]
async fn test_security_dast_on_directory_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let output = call(
        &dispatcher(dir.path()),
        "scanSecurity",
        json!({"target": dir.path(), "scanProfile": "dast"}),
    )
    .await;
    assert_eq!(output["success"], true);
    assert_eq!(output["summary"]["vulnerabilitiesFound"], 0);
    assert_eq!(output["summary"]["profileUsed"], "dast");
}

#[tokio::test]
async fn test_config_store_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());
    let create = json!({"action": "create", "configName": "smoke", "configData": {"a": 1}});

    assert_eq!(call(&d, "manageTestConfig", create.clone()).await["status"], "success");
    let again = call(&d, "manageTestConfig", create).await;
    assert_eq!(again["status"], "failure");
    assert!(again["message"].as_str().unwrap().contains("already exists"));

    let list = call(&d, "manageTestConfig", json!({"action": "list"})).await;
    assert_eq!(list["configsList"], json!(["smoke"]));

    call(&d, "manageTestConfig", json!({"action": "delete", "configName": "smoke"})).await;
    let read = call(&d, "manageTestConfig", json!({"action": "read", "configName": "smoke"})).await;
    assert_eq!(read["status"], "failure");
    assert!(read["message"].as_str().unwrap().contains("not found"));
}
