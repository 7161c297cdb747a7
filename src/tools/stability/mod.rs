//! `monitorStability`: periodic health checks against a target for a fixed
//! time window.
//!
//! Each iteration runs one probe check, inspects logs, samples host
//! resources and optionally generates load. Cadence is drift-free: wake-ups
//! are scheduled at `start + k * interval`, clamped to the deadline. A check
//! that overruns its slot moves the schedule forward to the present.

pub mod conditions;
pub mod probe;
pub mod tail;

use async_trait::async_trait;
use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::operations::OperationRegistry;
use super::{Environment, Tool, ToolStatus};
use crate::resources::{round2, ResourceUsageSummary, SystemSampler};
use crate::types::{Error, Result, StabilityConfig};
use crate::validation::parse_interval;

use conditions::{FailureCondition, ObservedMetrics};
use probe::{resolve_probe, Probe, ProbeOutcome};
use tail::{is_alert_line, LogTail};

/// Error rate above which a run with failures is `unstable` instead of `degraded`.
const UNSTABLE_ERROR_RATE: f64 = 10.0;

/// Log alert lines quoted in the per-check warning.
const LOG_ALERT_SAMPLE: usize = 5;

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoadLevel {
    Light,
    Moderate,
    Heavy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomLoad {
    /// Extra probe calls issued after every check.
    #[serde(default)]
    #[schemars(range(max = 1000))]
    pub requests_per_check: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Synthetic load applied during monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum LoadProfile {
    Level(LoadLevel),
    Custom(CustomLoad),
}

impl LoadProfile {
    pub fn requests_per_check(&self) -> u32 {
        match self {
            LoadProfile::Level(LoadLevel::Light) => 1,
            LoadProfile::Level(LoadLevel::Moderate) => 5,
            LoadProfile::Level(LoadLevel::Heavy) => 20,
            LoadProfile::Custom(custom) => custom.requests_per_check,
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStabilityInput {
    /// URL, registered `component::operation`, or script path.
    pub target_component: String,
    /// Monitoring window, e.g. `30s`, `5m`, `1h`.
    pub duration: String,
    #[serde(default)]
    pub check_interval: Option<String>,
    #[serde(default)]
    pub load_profile: Option<LoadProfile>,
    /// e.g. `errorRate > 5%`, `avgResponseTime > 2000ms`.
    #[serde(default)]
    pub failure_conditions: Option<Vec<String>>,
    #[serde(default)]
    pub environment: Environment,
    /// Log file whose new warning/error lines are reported.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StabilityIssue {
    /// RFC 3339.
    pub timestamp: String,
    pub severity: IssueSeverity,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_triggered: Option<String>,
}

impl StabilityIssue {
    fn new(severity: IssueSeverity, description: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            severity,
            description: description.into(),
            details,
            condition_triggered: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Stable,
    Degraded,
    Unstable,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StabilityReport {
    pub target_component: String,
    pub monitoring_duration_seconds: u64,
    pub check_interval_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_profile_applied: Option<LoadProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_conditions_evaluated: Option<Vec<String>>,
    pub total_checks: u64,
    pub successful_checks: u64,
    pub failed_checks: u64,
    pub uptime_percentage: f64,
    pub error_rate_percentage: f64,
    pub issues_found: Vec<StabilityIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_usage_summary: Option<ResourceUsageSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_summary: Option<Vec<String>>,
    pub final_status: FinalStatus,
    pub summary_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStabilityOutput {
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability_report: Option<StabilityReport>,
}

// =============================================================================
// Monitoring loop
// =============================================================================

/// Validated parameters of one monitoring run.
#[derive(Debug, Clone)]
pub struct MonitorPlan {
    pub duration: Duration,
    pub interval: Duration,
    pub load_calls: u32,
    pub probe_timeout: Duration,
    pub max_log_lines: usize,
    pub log_file: Option<PathBuf>,
}

/// Raw counters collected by the loop.
#[derive(Debug, Default)]
pub struct MonitorRun {
    pub total_checks: u64,
    pub successful_checks: u64,
    pub failed_checks: u64,
    pub response_times_ms: Vec<f64>,
    pub issues: Vec<StabilityIssue>,
    pub log_summary: Vec<String>,
    pub resource_usage: Option<ResourceUsageSummary>,
}

impl MonitorRun {
    fn observed(&self) -> ObservedMetrics {
        let (_, error_rate, _) = classify(self.total_checks, self.failed_checks);
        let avg = if self.response_times_ms.is_empty() {
            0.0
        } else {
            self.response_times_ms.iter().sum::<f64>() / self.response_times_ms.len() as f64
        };
        ObservedMetrics {
            error_rate_percent: error_rate,
            avg_response_ms: round2(avg),
            max_response_ms: round2(self.response_times_ms.iter().copied().fold(0.0, f64::max)),
            failed_checks: self.failed_checks,
        }
    }

    fn push_log_line(&mut self, max: usize, line: String) {
        if self.log_summary.len() < max {
            self.log_summary.push(line);
        }
    }
}

async fn timed_check(probe: &dyn Probe, timeout: Duration) -> (ProbeOutcome, f64) {
    let started = Instant::now();
    let outcome = match tokio::time::timeout(timeout, probe.check()).await {
        Ok(outcome) => outcome,
        Err(_) => ProbeOutcome::unhealthy(format!("probe timed out after {:?}", timeout)),
    };
    (outcome, started.elapsed().as_secs_f64() * 1000.0)
}

/// Run checks until `plan.duration` has elapsed.
pub async fn run_monitor(probe: &dyn Probe, plan: &MonitorPlan) -> MonitorRun {
    let mut run = MonitorRun::default();
    let mut sampler = SystemSampler::new();
    let mut samples = Vec::new();
    let mut log_tail = match &plan.log_file {
        Some(path) => Some(LogTail::open(path).await),
        None => None,
    };

    let start = Instant::now();
    let deadline = start + plan.duration;
    let mut next_wake = start;

    while start.elapsed() < plan.duration {
        run.total_checks += 1;
        let check = run.total_checks;

        // (a) health check
        let (outcome, elapsed_ms) = timed_check(probe, plan.probe_timeout).await;
        run.response_times_ms.push(elapsed_ms);
        if outcome.healthy {
            run.successful_checks += 1;
        } else {
            run.failed_checks += 1;
            let reason = outcome.detail.clone().unwrap_or_else(|| "unhealthy".to_string());
            tracing::debug!("check #{} failed: {}", check, reason);
            run.issues.push(StabilityIssue::new(
                IssueSeverity::Error,
                format!("Check #{} failed: {}", check, reason),
                Some(json!({ "check": check, "responseTimeMs": round2(elapsed_ms) })),
            ));
        }

        // (b) log inspection
        for warning in outcome.warnings {
            run.push_log_line(plan.max_log_lines, warning.clone());
            run.issues.push(StabilityIssue::new(
                IssueSeverity::Warning,
                format!("Warning reported by target during check #{}", check),
                Some(json!({ "logEntry": warning })),
            ));
        }
        if let Some(tail) = log_tail.as_mut() {
            match tail.poll().await {
                Ok(lines) => {
                    let alerts: Vec<String> = lines.into_iter().filter(|l| is_alert_line(l)).collect();
                    if !alerts.is_empty() {
                        for line in &alerts {
                            run.push_log_line(plan.max_log_lines, line.clone());
                        }
                        let sample: Vec<&String> = alerts.iter().take(LOG_ALERT_SAMPLE).collect();
                        run.issues.push(StabilityIssue::new(
                            IssueSeverity::Warning,
                            format!("{} log alert(s) detected during check #{}", alerts.len(), check),
                            Some(json!({ "count": alerts.len(), "logEntries": sample })),
                        ));
                    }
                }
                Err(e) => tracing::warn!("log inspection failed: {}", e),
            }
        }

        // (c) resources
        samples.push(sampler.sample());

        // (d) load
        if plan.load_calls > 0 {
            let mut failed = 0u32;
            for _ in 0..plan.load_calls {
                let (outcome, _) = timed_check(probe, plan.probe_timeout).await;
                if !outcome.healthy {
                    failed += 1;
                }
            }
            if failed > 0 {
                run.issues.push(StabilityIssue::new(
                    IssueSeverity::Warning,
                    format!(
                        "{} of {} load requests failed during check #{}",
                        failed, plan.load_calls, check
                    ),
                    None,
                ));
            }
        }

        // After an overrun the schedule restarts from now instead of bursting.
        next_wake = (next_wake + plan.interval).max(Instant::now());
        let wake = next_wake.min(deadline);
        if wake > Instant::now() {
            tokio::time::sleep_until(wake).await;
        }
    }

    run.resource_usage = ResourceUsageSummary::from_samples(&samples);
    run
}

/// `(uptime %, error rate %, final status)` for the given counts.
pub fn classify(total: u64, failed: u64) -> (f64, f64, FinalStatus) {
    if total == 0 {
        return (100.0, 0.0, FinalStatus::Stable);
    }
    let successful = total.saturating_sub(failed);
    let error_rate = failed as f64 / total as f64 * 100.0;
    let status = if failed == 0 {
        FinalStatus::Stable
    } else if error_rate > UNSTABLE_ERROR_RATE {
        FinalStatus::Unstable
    } else {
        FinalStatus::Degraded
    };
    let uptime = successful as f64 / total as f64 * 100.0;
    (round2(uptime), round2(error_rate), status)
}

// =============================================================================
// Tool
// =============================================================================

/// Monitors a target through a resolved probe.
#[derive(Debug)]
pub struct StabilityMonitor {
    config: StabilityConfig,
    operations: Arc<OperationRegistry>,
}

impl StabilityMonitor {
    pub fn new(config: StabilityConfig, operations: Arc<OperationRegistry>) -> Self {
        Self { config, operations }
    }

    /// Validate the input into a plan and its parsed failure conditions.
    pub fn plan(&self, input: &MonitorStabilityInput) -> Result<(MonitorPlan, Vec<FailureCondition>)> {
        if input.environment == Environment::Docker {
            tracing::warn!(
                "docker environment is not supported for stability monitoring, probing {} locally",
                input.target_component
            );
        }
        let duration = parse_interval(&input.duration, "duration")?;
        let interval = match &input.check_interval {
            Some(raw) => parse_interval(raw, "checkInterval")?,
            None => self.config.default_check_interval,
        };
        if interval > duration {
            return Err(Error::validation("checkInterval cannot be greater than duration"));
        }
        let conditions = conditions::parse_all(input.failure_conditions.as_deref().unwrap_or_default())?;

        Ok((
            MonitorPlan {
                duration,
                interval,
                load_calls: input.load_profile.as_ref().map_or(0, LoadProfile::requests_per_check),
                probe_timeout: self.config.probe_timeout,
                max_log_lines: self.config.max_log_summary_lines,
                log_file: input.log_file.clone(),
            },
            conditions,
        ))
    }

    /// Run a validated plan against `probe` and build the report.
    pub async fn monitor(
        &self,
        input: &MonitorStabilityInput,
        plan: &MonitorPlan,
        conditions: &[FailureCondition],
        probe: &dyn Probe,
    ) -> MonitorStabilityOutput {
        tracing::info!(
            "monitoring {} for {:?} every {:?}",
            input.target_component,
            plan.duration,
            plan.interval
        );
        let mut run = run_monitor(probe, plan).await;

        let observed = run.observed();
        for condition in conditions {
            if let Some(value) = condition.evaluate(&observed) {
                let mut issue = StabilityIssue::new(
                    IssueSeverity::Error,
                    format!("Failure condition triggered: {}", condition),
                    Some(json!({ "observed": value })),
                );
                issue.condition_triggered = Some(condition.to_string());
                run.issues.push(issue);
            }
        }

        let (uptime, error_rate, final_status) = classify(run.total_checks, run.failed_checks);
        let status = if run.failed_checks > 0 {
            ToolStatus::Failure
        } else {
            ToolStatus::Success
        };
        tracing::info!(
            "monitoring {} finished: {}/{} checks ok, {:?}",
            input.target_component,
            run.successful_checks,
            run.total_checks,
            final_status
        );

        let report = StabilityReport {
            target_component: input.target_component.clone(),
            monitoring_duration_seconds: plan.duration.as_secs(),
            check_interval_seconds: plan.interval.as_secs(),
            load_profile_applied: input.load_profile.clone(),
            failure_conditions_evaluated: input.failure_conditions.clone(),
            total_checks: run.total_checks,
            successful_checks: run.successful_checks,
            failed_checks: run.failed_checks,
            uptime_percentage: uptime,
            error_rate_percentage: error_rate,
            issues_found: run.issues,
            resource_usage_summary: run.resource_usage,
            log_summary: (!run.log_summary.is_empty()).then_some(run.log_summary),
            final_status,
            summary_message: format!(
                "Stability monitoring of {} over {}s finished. Status: {}.",
                input.target_component,
                plan.duration.as_secs(),
                match final_status {
                    FinalStatus::Stable => "stable",
                    FinalStatus::Degraded => "degraded",
                    FinalStatus::Unstable => "unstable",
                }
            ),
        };

        MonitorStabilityOutput {
            status,
            message: None,
            stability_report: Some(report),
        }
    }
}

fn validation_failed(e: Error) -> MonitorStabilityOutput {
    tracing::warn!("monitorStability input rejected: {}", e);
    MonitorStabilityOutput {
        status: ToolStatus::Error,
        message: Some(format!("Input validation failed: {}", e)),
        stability_report: None,
    }
}

#[async_trait]
impl Tool for StabilityMonitor {
    type Input = MonitorStabilityInput;
    type Output = MonitorStabilityOutput;

    const NAME: &'static str = "monitorStability";
    const DESCRIPTION: &'static str =
        "Monitors the stability of a component (URL, registered operation or script) over a time window.";

    async fn run(&self, input: Self::Input) -> Result<Self::Output> {
        let (plan, conditions) = match self.plan(&input) {
            Ok(plan) => plan,
            Err(e) => return Ok(validation_failed(e)),
        };
        let probe = match resolve_probe(&input.target_component, &self.operations, plan.probe_timeout) {
            Ok(probe) => probe,
            Err(e) => return Ok(validation_failed(e)),
        };
        Ok(self.monitor(&input, &plan, &conditions, probe.as_ref()).await)
    }
}
