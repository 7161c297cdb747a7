//! Test-runner output parsing.
//!
//! Two strategies, tried in order:
//! 1. a JSON report object carrying a boolean `success` (Jest `--json` shape);
//! 2. the human `Tests: N failed, N passed, N total` summary line.
//!
//! Parsing is pure: the same stdout always yields the same result.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::LazyLock;

/// Counts extracted from a test run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestSummary {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Wall-clock duration in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// One failed test or a run-level problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

impl TestError {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            test_name: None,
            message: message.into(),
            stack_trace: None,
        }
    }
}

/// Result of parsing one stdout capture.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTestOutput {
    pub summary: TestSummary,
    pub errors: Vec<TestError>,
    /// Structured report when one was found, otherwise `{rawOutput, parsingError?}`.
    pub detailed_results: Value,
}

#[allow(clippy::expect_used)]
static REPORT_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)\{.*"success"\s*:.*\}"#).expect("static pattern"));

#[allow(clippy::expect_used)]
static SUMMARY_COUNTS: LazyLock<[(Regex, Count); 4]> = LazyLock::new(|| {
    [
        (Regex::new(r"(\d+)\s+failed").expect("static pattern"), Count::Failed),
        (Regex::new(r"(\d+)\s+passed").expect("static pattern"), Count::Passed),
        (Regex::new(r"(\d+)\s+(?:skipped|pending|todo)").expect("static pattern"), Count::Skipped),
        (Regex::new(r"(\d+)\s+total").expect("static pattern"), Count::Total),
    ]
});

#[derive(Debug, Clone, Copy)]
enum Count {
    Failed,
    Passed,
    Skipped,
    Total,
}

/// Parse runner stdout into a summary, failures and detailed results.
pub fn parse_test_output(stdout: &str) -> ParsedTestOutput {
    match REPORT_SPAN.find(stdout) {
        Some(span) => match locate_report(span.as_str()) {
            Some(report) => from_report(report),
            None => malformed_report(stdout),
        },
        None => from_summary_line(stdout),
    }
}

/// The whole span first; failing that, the first object in it that carries a
/// boolean `success`.
fn locate_report(span: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(span) {
        if map.get("success").is_some_and(Value::is_boolean) {
            return Some(map);
        }
    }
    span.match_indices('{').find_map(|(start, _)| {
        let mut stream = serde_json::Deserializer::from_str(&span[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(map))) if map.get("success").is_some_and(Value::is_boolean) => {
                Some(map)
            }
            _ => None,
        }
    })
}

fn count(report: &Map<String, Value>, key: &str) -> u64 {
    report.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn from_report(report: Map<String, Value>) -> ParsedTestOutput {
    let summary = TestSummary {
        total: count(&report, "numTotalTests"),
        passed: count(&report, "numPassedTests"),
        failed: count(&report, "numFailedTests"),
        skipped: count(&report, "numPendingTests").saturating_add(count(&report, "numTodoTests")),
        duration: report_duration(&report),
    };

    let mut errors = Vec::new();
    for suite in suites(&report) {
        let before = errors.len();
        let assertions = suite
            .get("assertionResults")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for assertion in assertions {
            if assertion.get("status").and_then(Value::as_str) == Some("failed") {
                errors.push(assertion_error(assertion));
            }
        }
        // Suites that fail before running any assertion (syntax error, setup
        // failure) only carry a suite-level message.
        if errors.len() == before && suite.get("status").and_then(Value::as_str) == Some("failed") {
            let message = suite
                .get("failureMessage")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or("Test suite failed");
            errors.push(TestError {
                test_name: suite.get("name").and_then(Value::as_str).map(str::to_string),
                message: message.to_string(),
                stack_trace: None,
            });
        }
    }

    ParsedTestOutput {
        summary,
        errors,
        detailed_results: Value::Object(report),
    }
}

fn suites(report: &Map<String, Value>) -> impl Iterator<Item = &Map<String, Value>> {
    report
        .get("testResults")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn assertion_error(assertion: &Value) -> TestError {
    let test_name = ["fullName", "title"]
        .iter()
        .find_map(|k| assertion.get(*k).and_then(Value::as_str))
        .map(str::to_string);

    let messages: Vec<&str> = assertion
        .get("failureMessages")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();
    let message = if messages.is_empty() {
        "Test failed".to_string()
    } else {
        messages.join("\n")
    };

    let stacks: Vec<&str> = assertion
        .get("failureDetails")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|d| d.get("stack").and_then(Value::as_str))
        .collect();
    let stack_trace = (!stacks.is_empty()).then(|| stacks.join("\n\n"));

    TestError {
        test_name,
        message,
        stack_trace,
    }
}

/// Seconds between `startTime` and `endTime` (epoch ms). Without a top-level
/// `endTime` the latest per-suite `endTime` is used.
fn report_duration(report: &Map<String, Value>) -> Option<f64> {
    let start = report.get("startTime").and_then(Value::as_f64)?;
    let end = report.get("endTime").and_then(Value::as_f64).or_else(|| {
        suites(report)
            .filter_map(|s| s.get("endTime").and_then(Value::as_f64))
            .reduce(f64::max)
    })?;
    (end >= start).then(|| (end - start) / 1000.0)
}

fn malformed_report(stdout: &str) -> ParsedTestOutput {
    let reason = "output contains a \"success\" report that is not valid JSON";
    ParsedTestOutput {
        summary: TestSummary::default(),
        errors: vec![TestError::message(format!(
            "Failed to parse test output: {}",
            reason
        ))],
        detailed_results: json!({ "rawOutput": stdout, "parsingError": reason }),
    }
}

fn from_summary_line(stdout: &str) -> ParsedTestOutput {
    let Some(line) = stdout.lines().find(|l| l.contains("Tests:")) else {
        return ParsedTestOutput {
            summary: TestSummary::default(),
            errors: Vec::new(),
            detailed_results: json!({
                "rawOutput": stdout,
                "parsingError": "no recognizable test summary in output",
            }),
        };
    };

    let mut summary = TestSummary::default();
    let mut total = None;
    for (pattern, kind) in SUMMARY_COUNTS.iter() {
        let Some(n) = pattern
            .captures(line)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
        else {
            continue;
        };
        match kind {
            Count::Failed => summary.failed = n,
            Count::Passed => summary.passed = n,
            Count::Skipped => summary.skipped = n,
            Count::Total => total = Some(n),
        }
    }
    summary.total = total.unwrap_or_else(|| {
        summary
            .passed
            .saturating_add(summary.failed)
            .saturating_add(summary.skipped)
    });

    let errors = if summary.failed > 0 {
        vec![TestError::message(
            "One or more tests failed. See stdout for details.",
        )]
    } else {
        Vec::new()
    };

    ParsedTestOutput {
        summary,
        errors,
        detailed_results: json!({ "rawOutput": stdout }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const JEST_REPORT: &str = r#"
> jest --json
{"success":false,"startTime":1700000000000,"numTotalTests":3,"numPassedTests":1,"numFailedTests":1,"numPendingTests":1,
 "testResults":[{"name":"/app/sum.test.js","status":"failed","endTime":1700000002500,
   "assertionResults":[
     {"fullName":"sum adds","title":"adds","status":"passed","failureMessages":[]},
     {"fullName":"sum subtracts","title":"subtracts","status":"failed",
      "failureMessages":["expected 1 got 2"],"failureDetails":[{"stack":"at sum.test.js:4"}]}
   ]}]}
Done in 2.5s
"#;

    #[test]
    fn test_parses_json_report() {
        let parsed = parse_test_output(JEST_REPORT);
        assert_eq!(
            parsed.summary,
            TestSummary {
                total: 3,
                passed: 1,
                failed: 1,
                skipped: 1,
                duration: Some(2.5),
            }
        );
        assert_eq!(
            parsed.errors,
            vec![TestError {
                test_name: Some("sum subtracts".into()),
                message: "expected 1 got 2".into(),
                stack_trace: Some("at sum.test.js:4".into()),
            }]
        );
        assert_eq!(parsed.detailed_results["success"], false);
    }

    #[test]
    fn test_suite_level_failure_becomes_error() {
        let stdout = r#"{"success":false,"numTotalTests":0,"numFailedTests":0,"testResults":[{"name":"broken.test.js","status":"failed","failureMessage":"SyntaxError: Unexpected token","assertionResults":[]}]}"#;
        let parsed = parse_test_output(stdout);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].test_name.as_deref(), Some("broken.test.js"));
        assert!(parsed.errors[0].message.contains("SyntaxError"));
    }

    #[test]
    fn test_huge_summary_counts_saturate() {
        let parsed = parse_test_output("Tests: 18446744073709551615 passed, 1 failed\n");
        assert_eq!(parsed.summary.passed, u64::MAX);
        assert_eq!(parsed.summary.failed, 1);
        assert_eq!(parsed.summary.total, u64::MAX);
        assert_eq!(parsed.errors.len(), 1);

        let report = r#"{"success":true,"numTotalTests":1,"numPendingTests":18446744073709551615,"numTodoTests":1,"testResults":[]}"#;
        assert_eq!(parse_test_output(report).summary.skipped, u64::MAX);
    }

    #[test]
    fn test_report_surrounded_by_braces_in_noise() {
        let stdout = "warn {deprecated}\n{\"success\":true,\"numTotalTests\":2,\"numPassedTests\":2}\ntrailing }";
        let parsed = parse_test_output(stdout);
        assert_eq!(parsed.summary.total, 2);
        assert_eq!(parsed.summary.passed, 2);
        assert!(parsed.errors.is_empty());
    }

    #[test]
    fn test_malformed_report_degrades() {
        let parsed = parse_test_output(r#"{"success": true, "numTotalTests": }"#);
        assert_eq!(parsed.summary, TestSummary::default());
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.detailed_results["parsingError"].is_string());
    }

    #[test]
    fn test_summary_line_fallback() {
        let stdout = "PASS a.test.js\nFAIL b.test.js\nTests:       2 failed, 1 skipped, 7 passed, 10 total\n";
        let parsed = parse_test_output(stdout);
        assert_eq!(parsed.summary.failed, 2);
        assert_eq!(parsed.summary.passed, 7);
        assert_eq!(parsed.summary.skipped, 1);
        assert_eq!(parsed.summary.total, 10);
        assert_eq!(parsed.errors.len(), 1);
    }

    #[test]
    fn test_summary_line_without_total_sums_counts() {
        let parsed = parse_test_output("Tests: 4 passed, 1 failed\n");
        assert_eq!(parsed.summary.total, 5);
    }

    #[test]
    fn test_unrecognized_output_is_zero_summary_with_note() {
        let parsed = parse_test_output("");
        assert_eq!(parsed.summary, TestSummary::default());
        assert!(parsed.errors.is_empty());
        assert!(parsed.detailed_results["parsingError"].is_string());
    }

    proptest! {
        #[test]
        fn prop_parsing_is_idempotent(stdout in ".{0,300}") {
            let first = parse_test_output(&stdout);
            let second = parse_test_output(&stdout);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_summary_line_counts_roundtrip(failed in 0u64..1000, passed in 0u64..1000) {
            let stdout = format!("Tests: {} failed, {} passed, {} total", failed, passed, failed + passed);
            let parsed = parse_test_output(&stdout);
            prop_assert_eq!(parsed.summary.failed, failed);
            prop_assert_eq!(parsed.summary.passed, passed);
            prop_assert_eq!(parsed.summary.total, failed + passed);
        }
    }
}
