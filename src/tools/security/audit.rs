//! Dependency audit: runs the ecosystem's auditor and normalizes its JSON.
//!
//! Supported report shapes:
//! - npm v6 (`advisories` keyed by id),
//! - npm v7+ (`vulnerabilities` keyed by package, findings under `via`),
//! - cargo-audit (`vulnerabilities.list` plus `warnings`).

use serde_json::{Map, Value};
use std::path::Path;

use super::{Remediation, Severity, Vulnerability};
use crate::process::{self, CommandSpec};
use crate::types::{Error, Result, SecurityConfig};

/// Package ecosystem of a project directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ecosystem {
    Cargo,
    Npm,
}

impl Ecosystem {
    /// `Cargo.lock` means Rust, anything else is audited with npm.
    pub fn detect(project: &Path) -> Self {
        if project.join("Cargo.lock").is_file() {
            Ecosystem::Cargo
        } else {
            Ecosystem::Npm
        }
    }

    pub fn auditor(self) -> &'static str {
        match self {
            Ecosystem::Cargo => "cargo audit",
            Ecosystem::Npm => "npm audit",
        }
    }
}

/// Findings plus anything the auditor wrote to stderr.
#[derive(Debug, Default)]
pub struct AuditOutcome {
    pub ecosystem: Option<Ecosystem>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub stderr: Option<String>,
}

pub fn audit_command(ecosystem: Ecosystem, project: &Path, config: &SecurityConfig) -> CommandSpec {
    match ecosystem {
        Ecosystem::Cargo => CommandSpec::new(&config.cargo_program)
            .args(["audit", "--json"])
            .current_dir(project),
        Ecosystem::Npm => CommandSpec::new(&config.npm_program)
            .args(["audit", "--json", "--prefix"])
            .arg(project.to_string_lossy()),
    }
}

/// Audit the project at `project`.
///
/// A non-zero exit with a report on stdout is the normal "findings" outcome.
/// Spawn failures, timeouts, empty output on failure and unreadable reports
/// are errors.
pub async fn run_audit(project: &Path, config: &SecurityConfig) -> Result<AuditOutcome> {
    if !project.is_dir() {
        return Err(Error::validation(format!(
            "dependency audit target '{}' is not a directory",
            project.display()
        )));
    }
    let ecosystem = Ecosystem::detect(project);
    let spec = audit_command(ecosystem, project, config);
    tracing::info!("running '{}'", spec.display());

    let output = process::run_captured(&spec, config.audit_timeout).await?;
    if let process::ProcessPhase::Errored { reason } = &output.phase {
        return Err(Error::process(format!("{} did not complete: {}", ecosystem.auditor(), reason)));
    }
    let stderr = Some(output.stderr.trim().to_string()).filter(|s| !s.is_empty());
    if output.stdout.trim().is_empty() {
        if output.succeeded() {
            return Ok(AuditOutcome {
                ecosystem: Some(ecosystem),
                vulnerabilities: Vec::new(),
                stderr,
            });
        }
        return Err(Error::process(format!(
            "{} exited with code {} without output{}",
            ecosystem.auditor(),
            output.exit_code(),
            stderr.as_deref().map(|s| format!(": {}", s)).unwrap_or_default()
        )));
    }

    let report: Value = serde_json::from_str(&output.stdout).map_err(|e| {
        Error::process(format!("{} produced unreadable JSON: {}", ecosystem.auditor(), e))
    })?;
    let vulnerabilities = match ecosystem {
        Ecosystem::Cargo => parse_cargo_audit(&report),
        Ecosystem::Npm => parse_npm_audit(&report),
    };
    Ok(AuditOutcome {
        ecosystem: Some(ecosystem),
        vulnerabilities,
        stderr,
    })
}

// =============================================================================
// npm
// =============================================================================

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str)
}

fn owned(v: &Value, key: &str) -> Option<String> {
    str_field(v, key).map(str::to_string)
}

fn id_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalize `npm audit --json` output of any supported version.
pub fn parse_npm_audit(report: &Value) -> Vec<Vulnerability> {
    if let Some(advisories) = report.get("advisories").and_then(Value::as_object) {
        return parse_npm_v6(advisories);
    }
    if let Some(packages) = report.get("vulnerabilities").and_then(Value::as_object) {
        return parse_npm_v7(packages);
    }
    Vec::new()
}

fn parse_npm_v6(advisories: &Map<String, Value>) -> Vec<Vulnerability> {
    advisories
        .iter()
        .map(|(key, advisory)| {
            let package = owned(advisory, "module_name");
            Vulnerability {
                id: id_field(advisory, "id").or_else(|| Some(key.clone())),
                severity: Severity::from_label(str_field(advisory, "severity").unwrap_or_default()),
                title: owned(advisory, "title")
                    .or_else(|| package.clone())
                    .unwrap_or_else(|| format!("Advisory {}", key)),
                description: owned(advisory, "overview"),
                recommendation: owned(advisory, "recommendation"),
                package_version: advisory
                    .get("findings")
                    .and_then(Value::as_array)
                    .and_then(|f| f.first())
                    .and_then(|f| owned(f, "version")),
                package_name: package,
                remediation: owned(advisory, "patched_versions").map(|v| Remediation {
                    fix_version: Some(v),
                    details: None,
                }),
                cvss_score: advisory.get("cvss").and_then(|c| c.get("score")).and_then(Value::as_f64),
                reference_urls: str_field(advisory, "references").map(|refs| {
                    refs.lines()
                        .map(|l| l.trim().trim_start_matches("- ").to_string())
                        .filter(|l| !l.is_empty())
                        .collect()
                }),
                ..Vulnerability::default()
            }
        })
        .collect()
}

fn parse_npm_v7(packages: &Map<String, Value>) -> Vec<Vulnerability> {
    let mut found = Vec::new();
    for (name, entry) in packages {
        let remediation = match entry.get("fixAvailable") {
            Some(Value::Object(fix)) => Some(Remediation {
                fix_version: fix.get("version").and_then(Value::as_str).map(str::to_string),
                details: fix.get("name").and_then(Value::as_str).map(|n| {
                    let major = fix.get("isSemVerMajor").and_then(Value::as_bool) == Some(true);
                    format!("Upgrade {}{}", n, if major { " (semver-major)" } else { "" })
                }),
            }),
            Some(Value::Bool(true)) => Some(Remediation {
                fix_version: None,
                details: Some("Run `npm audit fix`".to_string()),
            }),
            _ => None,
        };
        let package_severity = Severity::from_label(str_field(entry, "severity").unwrap_or_default());
        let via = entry.get("via").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();

        let direct: Vec<&Value> = via.iter().filter(|v| v.is_object()).collect();
        if direct.is_empty() {
            let through: Vec<&str> = via.iter().filter_map(Value::as_str).collect();
            found.push(Vulnerability {
                id: None,
                severity: package_severity,
                title: format!("Vulnerable dependency via {}", through.join(", ")),
                package_name: Some(name.clone()),
                package_version: owned(entry, "range"),
                remediation: remediation.clone(),
                ..Vulnerability::default()
            });
            continue;
        }
        for advisory in direct {
            found.push(Vulnerability {
                id: id_field(advisory, "source"),
                severity: str_field(advisory, "severity")
                    .map(Severity::from_label)
                    .unwrap_or(package_severity),
                title: owned(advisory, "title").unwrap_or_else(|| name.clone()),
                package_name: Some(name.clone()),
                package_version: owned(advisory, "range"),
                remediation: remediation.clone(),
                cvss_score: advisory.get("cvss").and_then(|c| c.get("score")).and_then(Value::as_f64),
                reference_urls: owned(advisory, "url").map(|u| vec![u]),
                ..Vulnerability::default()
            });
        }
    }
    found
}

// =============================================================================
// cargo-audit
// =============================================================================

/// Normalize `cargo audit --json` output.
pub fn parse_cargo_audit(report: &Value) -> Vec<Vulnerability> {
    let mut found: Vec<Vulnerability> = report
        .get("vulnerabilities")
        .and_then(|v| v.get("list"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|entry| cargo_entry(entry, None))
        .collect();

    if let Some(warnings) = report.get("warnings").and_then(Value::as_object) {
        for (kind, list) in warnings {
            let severity = match kind.as_str() {
                "unsound" => Severity::Medium,
                "unmaintained" | "yanked" => Severity::Low,
                _ => Severity::Info,
            };
            for entry in list.as_array().into_iter().flatten() {
                found.push(cargo_entry(entry, Some((kind.as_str(), severity))));
            }
        }
    }
    found
}

fn cargo_entry(entry: &Value, warning: Option<(&str, Severity)>) -> Vulnerability {
    let advisory = entry.get("advisory").filter(|a| a.is_object());
    let package = entry.get("package");
    let package_name = package.and_then(|p| owned(p, "name"));
    let patched: Vec<&str> = entry
        .get("versions")
        .and_then(|v| v.get("patched"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();

    let title = advisory
        .and_then(|a| owned(a, "title"))
        .or_else(|| {
            warning.map(|(kind, _)| {
                format!("{} crate: {}", kind, package_name.as_deref().unwrap_or("unknown"))
            })
        })
        .unwrap_or_else(|| "cargo-audit finding".to_string());

    let mut references: Vec<String> = advisory
        .and_then(|a| owned(a, "url"))
        .into_iter()
        .collect();
    references.extend(
        advisory
            .and_then(|a| a.get("references"))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(str::to_string),
    );

    Vulnerability {
        id: advisory.and_then(|a| owned(a, "id")),
        // cargo-audit does not grade advisories; treat them as high.
        severity: warning.map_or(Severity::High, |(_, s)| s),
        title,
        description: advisory.and_then(|a| owned(a, "description")),
        package_version: package.and_then(|p| owned(p, "version")),
        package_name,
        remediation: (!patched.is_empty()).then(|| Remediation {
            fix_version: Some(patched.join(" || ")),
            details: None,
        }),
        reference_urls: (!references.is_empty()).then_some(references),
        ..Vulnerability::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_npm_v6_advisories() {
        let report = json!({
            "advisories": {
                "1179": {
                    "id": 1179,
                    "title": "Prototype Pollution",
                    "module_name": "minimist",
                    "severity": "moderate",
                    "overview": "minimist is vulnerable",
                    "recommendation": "Upgrade to 1.2.3",
                    "patched_versions": ">=1.2.3",
                    "references": "- https://a.example\n- https://b.example",
                    "cvss": {"score": 5.6},
                    "findings": [{"version": "1.2.0"}]
                }
            }
        });
        let found = parse_npm_audit(&report);
        assert_eq!(found.len(), 1);
        let v = &found[0];
        assert_eq!(v.id.as_deref(), Some("1179"));
        assert_eq!(v.severity, Severity::Medium);
        assert_eq!(v.package_name.as_deref(), Some("minimist"));
        assert_eq!(v.package_version.as_deref(), Some("1.2.0"));
        assert_eq!(v.cvss_score, Some(5.6));
        assert_eq!(
            v.reference_urls.as_deref().unwrap(),
            ["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_npm_v7_vulnerabilities() {
        let report = json!({
            "auditReportVersion": 2,
            "vulnerabilities": {
                "lodash": {
                    "name": "lodash",
                    "severity": "high",
                    "via": [{"source": 1523, "title": "Command Injection", "url": "https://gh.example/1523", "severity": "critical", "range": "<4.17.21", "cvss": {"score": 7.2}}],
                    "fixAvailable": {"name": "lodash", "version": "4.17.21", "isSemVerMajor": false}
                },
                "wrapper": {
                    "name": "wrapper",
                    "severity": "high",
                    "via": ["lodash"],
                    "range": "1.0.0",
                    "fixAvailable": true
                }
            }
        });
        let mut found = parse_npm_audit(&report);
        found.sort_by(|a, b| a.package_name.cmp(&b.package_name));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id.as_deref(), Some("1523"));
        assert_eq!(found[0].severity, Severity::Critical);
        assert_eq!(
            found[0].remediation.as_ref().unwrap().fix_version.as_deref(),
            Some("4.17.21")
        );
        assert_eq!(found[1].title, "Vulnerable dependency via lodash");
        assert_eq!(found[1].severity, Severity::High);
    }

    #[test]
    fn test_cargo_audit_list_and_warnings() {
        let report = json!({
            "vulnerabilities": {
                "found": true,
                "count": 1,
                "list": [{
                    "advisory": {"id": "RUSTSEC-2020-0071", "title": "Potential segfault in time", "description": "...", "url": "https://rustsec.org/advisories/RUSTSEC-2020-0071", "references": []},
                    "versions": {"patched": [">=0.2.23"]},
                    "package": {"name": "time", "version": "0.1.45"}
                }]
            },
            "warnings": {
                "unmaintained": [{
                    "kind": "unmaintained",
                    "advisory": {"id": "RUSTSEC-2021-0139", "title": "ansi_term is unmaintained"},
                    "package": {"name": "ansi_term", "version": "0.12.1"}
                }],
                "yanked": [{"kind": "yanked", "advisory": null, "package": {"name": "foo", "version": "0.1.0"}}]
            }
        });
        let found = parse_cargo_audit(&report);
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].id.as_deref(), Some("RUSTSEC-2020-0071"));
        assert_eq!(found[0].severity, Severity::High);
        assert_eq!(found[0].remediation.as_ref().unwrap().fix_version.as_deref(), Some(">=0.2.23"));
        assert!(found.iter().any(|v| v.title == "yanked crate: foo" && v.severity == Severity::Low));
    }

    #[test]
    fn test_detect_ecosystem() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Ecosystem::detect(dir.path()), Ecosystem::Npm);
        std::fs::write(dir.path().join("Cargo.lock"), "").unwrap();
        assert_eq!(Ecosystem::detect(dir.path()), Ecosystem::Cargo);
    }

    #[test]
    fn test_npm_command_line() {
        let spec = audit_command(Ecosystem::Npm, Path::new("/srv/app"), &SecurityConfig::default());
        assert_eq!(spec.display(), "npm audit --json --prefix /srv/app");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_with_report_is_findings() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("fake-npm");
        let mut file = std::fs::File::create(&fake).unwrap();
        writeln!(
            file,
            "#!/bin/sh\necho '{{\"vulnerabilities\":{{\"x\":{{\"severity\":\"low\",\"via\":[{{\"source\":1,\"title\":\"t\"}}]}}}}}}'\nexit 1"
        )
        .unwrap();
        drop(file);
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = SecurityConfig {
            npm_program: fake.to_string_lossy().into_owned(),
            ..SecurityConfig::default()
        };
        let outcome = run_audit(dir.path(), &config).await.unwrap();
        assert_eq!(outcome.vulnerabilities.len(), 1);
        assert_eq!(outcome.vulnerabilities[0].severity, Severity::Low);
    }

    #[tokio::test]
    async fn test_missing_auditor_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = SecurityConfig {
            npm_program: "/nonexistent/npm".into(),
            ..SecurityConfig::default()
        };
        assert!(run_audit(dir.path(), &config).await.is_err());
    }
}
