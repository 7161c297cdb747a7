//! `scanSecurity`: dependency audit, static pattern scan and dynamic header
//! check, alone or chained by the `full` profile.

pub mod audit;
pub mod dast;
pub mod sast;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::time::Instant;

use super::{Environment, Tool};
use crate::types::{Result, SecurityConfig};

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScanProfile {
    /// Alias of `dependency_check`.
    Basic,
    DependencyCheck,
    Sast,
    Dast,
    Full,
}

impl ScanProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanProfile::Basic => "basic",
            ScanProfile::DependencyCheck => "dependency_check",
            ScanProfile::Sast => "sast",
            ScanProfile::Dast => "dast",
            ScanProfile::Full => "full",
        }
    }

    fn includes_dependencies(self) -> bool {
        matches!(self, ScanProfile::Basic | ScanProfile::DependencyCheck | ScanProfile::Full)
    }

    fn includes_sast(self) -> bool {
        matches!(self, ScanProfile::Sast | ScanProfile::Full)
    }

    fn includes_dast(self) -> bool {
        matches!(self, ScanProfile::Dast | ScanProfile::Full)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    #[default]
    Info,
}

impl Severity {
    /// Map auditor severity labels (npm uses `moderate`).
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "moderate" | "medium" => Severity::Medium,
            "low" => Severity::Low,
            _ => Severity::Info,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Remediation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub severity: Severity,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<Remediation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_urls: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanSecurityInput {
    /// Project directory or URL.
    pub target: String,
    pub scan_profile: ScanProfile,
    /// JSON file with `{"ignoreIds": [...]}`.
    #[serde(default)]
    pub config_path: Option<PathBuf>,
    #[serde(default)]
    pub environment: Environment,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub profile_used: String,
    pub target_scanned: String,
    pub vulnerabilities_found: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
    pub duration_ms: u64,
}

impl ScanSummary {
    fn tally(&mut self, findings: &[Vulnerability]) {
        self.vulnerabilities_found = findings.len();
        for finding in findings {
            match finding.severity {
                Severity::Critical => self.critical += 1,
                Severity::High => self.high += 1,
                Severity::Medium => self.medium += 1,
                Severity::Low => self.low += 1,
                Severity::Info => self.info += 1,
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanSecurityOutput {
    /// `false` only when a scan stage could not be executed.
    pub success: bool,
    pub message: String,
    pub summary: ScanSummary,
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_log: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanConfigFile {
    #[serde(default)]
    ignore_ids: Vec<String>,
}

// =============================================================================
// Scanner
// =============================================================================

/// Accumulated state of one scan across its stages.
#[derive(Debug, Default)]
struct ScanState {
    success: bool,
    messages: Vec<String>,
    error_log: Vec<String>,
    findings: Vec<Vulnerability>,
}

impl ScanState {
    fn fail(&mut self, message: String, error: String) {
        self.success = false;
        self.messages.push(message);
        self.error_log.push(error);
    }
}

#[derive(Debug)]
pub struct SecurityScanner {
    config: SecurityConfig,
}

impl SecurityScanner {
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    async fn dependency_stage(&self, input: &ScanSecurityInput, state: &mut ScanState) {
        if input.environment == Environment::Docker {
            let message = format!(
                "Dependency check in a docker environment is not implemented yet for {}.",
                input.target
            );
            tracing::warn!("{}", message);
            state.findings.push(Vulnerability {
                id: Some("docker-dep-check-todo".to_string()),
                severity: Severity::Info,
                title: "Docker dependency check not implemented".to_string(),
                description: Some(format!(
                    "Dependency checks inside docker for {} still need to be implemented.",
                    input.target
                )),
                ..Vulnerability::default()
            });
            state.messages.push(message);
            return;
        }

        match audit::run_audit(Path::new(&input.target), &self.config).await {
            Ok(outcome) => {
                if let (Some(stderr), Some(ecosystem)) = (outcome.stderr, outcome.ecosystem) {
                    tracing::warn!("{} stderr: {}", ecosystem.auditor(), stderr);
                    state.error_log.push(format!("{} stderr: {}", ecosystem.auditor(), stderr));
                }
                state.messages.push(format!(
                    "Dependency check for \"{}\" completed with {} finding(s).",
                    input.target,
                    outcome.vulnerabilities.len()
                ));
                state.findings.extend(outcome.vulnerabilities);
            }
            Err(e) => {
                tracing::error!("dependency audit of {} failed: {}", input.target, e);
                state.fail(
                    format!("Dependency check for \"{}\" failed.", input.target),
                    format!("dependency audit execution error: {}", e),
                );
            }
        }
    }

    async fn sast_stage(&self, input: &ScanSecurityInput, state: &mut ScanState) {
        let root = PathBuf::from(&input.target);
        if !root.is_dir() {
            tracing::warn!("SAST skipped for {}: not a directory", input.target);
            state
                .messages
                .push(format!("SAST skipped for \"{}\" (not a directory).", input.target));
            state.error_log.push(format!(
                "SAST scan skipped for target \"{}\" as it is not a directory.",
                input.target
            ));
            return;
        }
        match tokio::task::spawn_blocking(move || sast::scan_tree(&root)).await {
            Ok(found) => {
                state.messages.push(format!(
                    "SAST for \"{}\" completed with {} finding(s).",
                    input.target,
                    found.len()
                ));
                state.findings.extend(found);
            }
            Err(e) => state.fail(
                format!("SAST for \"{}\" failed.", input.target),
                format!("SAST execution error: {}", e),
            ),
        }
    }

    async fn dast_stage(&self, input: &ScanSecurityInput, state: &mut ScanState) {
        if !dast::is_url(&input.target) {
            tracing::warn!("DAST skipped for {}: not a URL", input.target);
            state
                .messages
                .push(format!("DAST skipped for \"{}\" (not a URL).", input.target));
            state.error_log.push(format!(
                "DAST scan skipped for target \"{}\" as it is not a URL.",
                input.target
            ));
            return;
        }
        let result = match reqwest::Client::builder().timeout(self.config.http_timeout).build() {
            Ok(client) => dast::scan_endpoint(&client, &input.target).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(found) => {
                state.messages.push(format!(
                    "DAST for \"{}\" completed with {} finding(s).",
                    input.target,
                    found.len()
                ));
                state.findings.extend(found);
            }
            Err(e) => {
                tracing::error!("DAST of {} failed: {}", input.target, e);
                state.fail(
                    format!("DAST for \"{}\" failed.", input.target),
                    format!("DAST execution error: {}", e),
                );
            }
        }
    }

    /// Ids to suppress, from `configPath`.
    async fn ignored_ids(&self, config_path: &Path, state: &mut ScanState) -> HashSet<String> {
        let parsed = match tokio::fs::read_to_string(config_path).await {
            Ok(raw) => serde_json::from_str::<ScanConfigFile>(&raw).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match parsed {
            Ok(file) => file.ignore_ids.into_iter().collect(),
            Err(e) => {
                tracing::warn!("scan config {} unusable: {}", config_path.display(), e);
                state.error_log.push(format!(
                    "scan config {} could not be read: {}",
                    config_path.display(),
                    e
                ));
                HashSet::new()
            }
        }
    }
}

#[async_trait]
impl Tool for SecurityScanner {
    type Input = ScanSecurityInput;
    type Output = ScanSecurityOutput;

    const NAME: &'static str = "scanSecurity";
    const DESCRIPTION: &'static str =
        "Runs security scans (dependency audit, static patterns, HTTP header checks) against a project directory or URL.";

    async fn run(&self, input: Self::Input) -> Result<Self::Output> {
        let started = Instant::now();
        let profile = input.scan_profile;
        tracing::info!("scanSecurity profile={} target={}", profile.as_str(), input.target);

        let mut state = ScanState {
            success: true,
            ..ScanState::default()
        };
        if profile.includes_dependencies() {
            self.dependency_stage(&input, &mut state).await;
        }
        if profile.includes_sast() {
            self.sast_stage(&input, &mut state).await;
        }
        if profile.includes_dast() {
            self.dast_stage(&input, &mut state).await;
        }

        if let Some(path) = &input.config_path {
            let ignored = self.ignored_ids(path, &mut state).await;
            if !ignored.is_empty() {
                let before = state.findings.len();
                state
                    .findings
                    .retain(|v| v.id.as_ref().map_or(true, |id| !ignored.contains(id)));
                tracing::debug!("suppressed {} ignored finding(s)", before - state.findings.len());
            }
        }

        let mut summary = ScanSummary {
            profile_used: profile.as_str().to_string(),
            target_scanned: input.target.clone(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            ..ScanSummary::default()
        };
        summary.tally(&state.findings);
        tracing::info!(
            "scan finished: success={} findings={}",
            state.success,
            summary.vulnerabilities_found
        );

        let message = if state.success && state.findings.is_empty() {
            format!(
                "Security scan ({}) of \"{}\" completed without findings.",
                profile.as_str(),
                input.target
            )
        } else {
            state.messages.join(" ")
        };

        Ok(ScanSecurityOutput {
            success: state.success,
            message,
            summary,
            vulnerabilities: state.findings,
            error_log: (!state.error_log.is_empty()).then_some(state.error_log),
        })
    }
}
