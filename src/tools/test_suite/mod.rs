//! `executeTestSuite`: run a test suite in a subprocess and parse its report.

pub mod parser;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Environment, Tool, ToolStatus};
use crate::process::{self, CommandSpec, ProcessOutput, ProcessPhase};
use crate::types::{Error, Result, TestRunId, TestRunnerConfig};

pub use parser::{parse_test_output, ParsedTestOutput, TestError, TestSummary};

/// Environment variable carrying the caller's `config` object as JSON.
pub const TEST_CONFIG_ENV: &str = "QUALITY_GUARD_TEST_CONFIG";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTestSuiteInput {
    /// Suite to run (`unit`, `integration`, `e2e` or a path/pattern).
    pub suite_name: String,
    #[serde(default)]
    pub target_component: Option<String>,
    #[serde(default = "default_environment")]
    pub environment: Environment,
    /// Runner configuration, forwarded to the child process.
    #[serde(default)]
    pub config: Option<Map<String, Value>>,
    #[serde(default)]
    pub additional_args: Vec<String>,
}

fn default_environment() -> Environment {
    Environment::Docker
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessLogs {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTestSuiteOutput {
    pub status: ToolStatus,
    pub test_run_id: TestRunId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<TestSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailed_results: Option<Value>,
    pub errors: Vec<TestError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<ProcessLogs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Runs suites through the configured docker script or local runner.
#[derive(Debug, Clone)]
pub struct TestSuiteRunner {
    config: TestRunnerConfig,
}

impl TestSuiteRunner {
    pub fn new(config: TestRunnerConfig) -> Self {
        Self { config }
    }

    /// Build the command line for `input`.
    pub fn command_for(&self, input: &ExecuteTestSuiteInput) -> Result<CommandSpec> {
        let mut spec = match input.environment {
            Environment::Docker => {
                let mut spec = CommandSpec::new(self.config.docker_script.to_string_lossy())
                    .arg(&input.suite_name);
                if let Some(target) = &input.target_component {
                    spec = spec.args(["--targetComponent", target.as_str()]);
                }
                spec
            }
            Environment::Local => {
                let (program, leading) = self.config.local_command.split_first().ok_or_else(|| {
                    Error::validation("testRunner.localCommand is empty")
                })?;
                let mut spec = CommandSpec::new(program)
                    .args(leading.iter().cloned())
                    .arg(&input.suite_name);
                if let Some(target) = &input.target_component {
                    spec = spec.arg(target);
                }
                spec
            }
        };
        spec = spec.args(input.additional_args.iter().cloned());
        if let Some(config) = &input.config {
            spec = spec.env(TEST_CONFIG_ENV, serde_json::to_string(config)?);
        }
        Ok(spec)
    }
}

#[async_trait]
impl Tool for TestSuiteRunner {
    type Input = ExecuteTestSuiteInput;
    type Output = ExecuteTestSuiteOutput;

    const NAME: &'static str = "executeTestSuite";
    const DESCRIPTION: &'static str =
        "Runs a test suite (unit, integration, e2e...) in docker or locally and returns parsed results.";

    async fn run(&self, input: Self::Input) -> Result<Self::Output> {
        let test_run_id = TestRunId::new();
        tracing::info!(
            "executeTestSuite {} suite={} environment={:?}",
            test_run_id,
            input.suite_name,
            input.environment
        );

        let spec = match self.command_for(&input) {
            Ok(spec) => spec,
            Err(e) => return Ok(error_output(test_run_id, e.to_string(), None)),
        };
        tracing::debug!("running '{}'", spec.display());

        let output = match process::run_captured(&spec, self.config.timeout).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("failed to start test runner: {}", e);
                return Ok(error_output(
                    test_run_id,
                    format!("Failed to start test runner: {}", e),
                    Some(ProcessLogs {
                        stdout: String::new(),
                        stderr: String::new(),
                        exit_code: process::UNKNOWN_EXIT_CODE,
                    }),
                ));
            }
        };

        Ok(classify(test_run_id, input.environment, output))
    }
}

fn error_output(test_run_id: TestRunId, message: String, logs: Option<ProcessLogs>) -> ExecuteTestSuiteOutput {
    ExecuteTestSuiteOutput {
        status: ToolStatus::Error,
        test_run_id,
        summary: None,
        detailed_results: None,
        errors: vec![TestError::message(message.clone())],
        logs,
        message: Some(message),
    }
}

/// Map a finished run onto the three-tier status.
fn classify(test_run_id: TestRunId, environment: Environment, output: ProcessOutput) -> ExecuteTestSuiteOutput {
    let exit_code = output.exit_code();
    let parsed = parse_test_output(&output.stdout);
    let logs = ProcessLogs {
        stdout: output.stdout,
        stderr: output.stderr,
        exit_code,
    };

    if let ProcessPhase::Errored { reason } = output.phase {
        tracing::warn!("test run {} did not complete: {}", test_run_id, reason);
        let message = format!("Test run did not complete: {}", reason);
        return ExecuteTestSuiteOutput {
            summary: Some(parsed.summary),
            detailed_results: Some(parsed.detailed_results),
            ..error_output(test_run_id, message, Some(logs))
        };
    }

    tracing::info!("test run {} exited with code {}", test_run_id, exit_code);
    if exit_code != 0 {
        let errors = if parsed.errors.is_empty() {
            vec![TestError::message(format!(
                "Test run failed with exit code {}. See logs.",
                exit_code
            ))]
        } else {
            parsed.errors
        };
        let place = match environment {
            Environment::Docker => "in docker",
            Environment::Local => "locally",
        };
        return ExecuteTestSuiteOutput {
            status: ToolStatus::Failure,
            test_run_id,
            summary: Some(parsed.summary),
            detailed_results: Some(parsed.detailed_results),
            errors,
            logs: Some(logs),
            message: Some(format!("Test run {} failed with exit code {}.", place, exit_code)),
        };
    }

    let status = if parsed.summary.failed > 0 || !parsed.errors.is_empty() {
        ToolStatus::Failure
    } else {
        ToolStatus::Success
    };
    ExecuteTestSuiteOutput {
        status,
        test_run_id,
        summary: Some(parsed.summary),
        detailed_results: Some(parsed.detailed_results),
        errors: parsed.errors,
        logs: Some(logs),
        message: None,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::Duration;

    fn script(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("runner.sh");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{}", body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn runner(local_command: Vec<&str>) -> TestSuiteRunner {
        TestSuiteRunner::new(TestRunnerConfig {
            local_command: local_command.into_iter().map(String::from).collect(),
            ..TestRunnerConfig::default()
        })
    }

    fn input(environment: Environment) -> ExecuteTestSuiteInput {
        ExecuteTestSuiteInput {
            suite_name: "unit".into(),
            target_component: Some("core".into()),
            environment,
            config: None,
            additional_args: vec!["--ci".into()],
        }
    }

    #[test]
    fn test_docker_command_line() {
        let runner = TestSuiteRunner::new(TestRunnerConfig::default());
        let spec = runner.command_for(&input(Environment::Docker)).unwrap();
        assert_eq!(spec.program, "tools/scripts/qa/run_tests_in_docker.sh");
        assert_eq!(spec.args, vec!["unit", "--targetComponent", "core", "--ci"]);
    }

    #[test]
    fn test_local_command_line_and_config_env() {
        let runner = TestSuiteRunner::new(TestRunnerConfig::default());
        let mut req = input(Environment::Local);
        req.config = serde_json::json!({"retries": 2}).as_object().cloned();
        let spec = runner.command_for(&req).unwrap();
        assert_eq!(spec.program, "npx");
        assert_eq!(spec.args, vec!["jest", "--json", "unit", "core", "--ci"]);
        assert_eq!(spec.env.get(TEST_CONFIG_ENV).unwrap(), r#"{"retries":2}"#);
    }

    #[tokio::test]
    async fn test_passing_run_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            dir.path(),
            r#"echo '{"success":true,"numTotalTests":2,"numPassedTests":2,"numFailedTests":0,"numPendingTests":0}'"#,
        );
        let output = runner(vec![path.to_str().unwrap()])
            .run(input(Environment::Local))
            .await
            .unwrap();
        assert_eq!(output.status, ToolStatus::Success);
        assert_eq!(output.summary.unwrap().passed, 2);
        assert!(output.errors.is_empty());
        assert_eq!(output.logs.unwrap().exit_code, 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_report_synthesizes_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "echo boom >&2; exit 2");
        let output = runner(vec![path.to_str().unwrap()])
            .run(input(Environment::Local))
            .await
            .unwrap();
        assert_eq!(output.status, ToolStatus::Failure);
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].message.contains("exit code 2"));
        let logs = output.logs.unwrap();
        assert_eq!(logs.exit_code, 2);
        assert_eq!(logs.stderr.trim(), "boom");
    }

    #[tokio::test]
    async fn test_exit_zero_with_failures_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "echo 'Tests: 1 failed, 3 passed, 4 total'");
        let output = runner(vec![path.to_str().unwrap()])
            .run(input(Environment::Local))
            .await
            .unwrap();
        assert_eq!(output.status, ToolStatus::Failure);
        assert_eq!(output.summary.unwrap().failed, 1);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_error() {
        let output = runner(vec!["/nonexistent/test-runner"])
            .run(input(Environment::Local))
            .await
            .unwrap();
        assert_eq!(output.status, ToolStatus::Error);
        assert!(output.message.unwrap().contains("Failed to start test runner"));
        assert_eq!(output.logs.unwrap().exit_code, -1);
    }

    #[tokio::test]
    async fn test_timeout_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "sleep 30");
        let runner = TestSuiteRunner::new(TestRunnerConfig {
            local_command: vec![path.to_string_lossy().into_owned()],
            timeout: Some(Duration::from_millis(200)),
            ..TestRunnerConfig::default()
        });
        let output = runner.run(input(Environment::Local)).await.unwrap();
        assert_eq!(output.status, ToolStatus::Error);
    }

    #[tokio::test]
    async fn test_config_reaches_child() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            dir.path(),
            &format!("echo \"Tests: 0 failed, 1 passed, 1 total\"; echo \"${}\" >&2", TEST_CONFIG_ENV),
        );
        let mut req = input(Environment::Local);
        req.config = serde_json::json!({"shard": 1}).as_object().cloned();
        let output = runner(vec![path.to_str().unwrap()]).run(req).await.unwrap();
        assert_eq!(output.status, ToolStatus::Success);
        assert_eq!(output.logs.unwrap().stderr.trim(), r#"{"shard":1}"#);
    }
}
