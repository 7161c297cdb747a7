//! Configuration structures.
//!
//! Configuration is loaded from an optional JSON file and then overridden by
//! CLI flags / environment variables in `main`. Every section has defaults so
//! an empty file (or no file) yields a working server.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::errors::{Error, Result};

/// Global server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Filesystem locations owned by the config store and report generator.
    #[serde(default)]
    pub storage: StorageConfig,

    /// External test runner commands.
    #[serde(default)]
    pub test_runner: TestRunnerConfig,

    /// Security scanner programs and timeouts.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Stability monitor defaults.
    #[serde(default)]
    pub stability: StabilityConfig,
}

impl Config {
    /// Load configuration from a JSON file. Missing sections use defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::validation(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// HTTP bind address.
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3005".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObservabilityConfig {
    /// Tracing log level used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageConfig {
    /// Default directory for named test configurations.
    pub config_dir: PathBuf,

    /// Directory that receives rendered reports.
    pub reports_dir: PathBuf,

    /// Directory searched for report templates.
    pub templates_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("configs/qa_test_configs"),
            reports_dir: PathBuf::from("reports/quality_guard"),
            templates_dir: PathBuf::from("templates/reports"),
        }
    }
}

/// Test runner commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TestRunnerConfig {
    /// Program + leading arguments for local runs. The suite name and
    /// target component are appended.
    pub local_command: Vec<String>,

    /// Script that runs the suite inside a container.
    pub docker_script: PathBuf,

    /// Kill the runner after this long. `None` waits for the runner to exit.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for TestRunnerConfig {
    fn default() -> Self {
        Self {
            local_command: vec!["npx".to_string(), "jest".to_string(), "--json".to_string()],
            docker_script: PathBuf::from("tools/scripts/qa/run_tests_in_docker.sh"),
            timeout: None,
        }
    }
}

/// Security scanner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecurityConfig {
    /// `npm` executable used for Node projects.
    pub npm_program: String,

    /// `cargo` executable used for Rust projects (needs `cargo-audit`).
    pub cargo_program: String,

    /// Kill the audit tool after this long. `None` waits indefinitely.
    #[serde(default, with = "humantime_serde")]
    pub audit_timeout: Option<Duration>,

    /// Request timeout for dynamic (HTTP) scans.
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            npm_program: "npm".to_string(),
            cargo_program: "cargo".to_string(),
            audit_timeout: None,
            http_timeout: Duration::from_secs(15),
        }
    }
}

/// Stability monitor defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StabilityConfig {
    /// Interval used when the caller omits `checkInterval`.
    #[serde(with = "humantime_serde")]
    pub default_check_interval: Duration,

    /// Upper bound on a single probe (HTTP request or script run).
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// Maximum number of log lines kept in `logSummary`.
    pub max_log_summary_lines: usize,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            default_check_interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(30),
            max_log_summary_lines: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1:3005");
        assert_eq!(config.stability.default_check_interval, Duration::from_secs(10));
        assert!(config.test_runner.timeout.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"server": {"listenAddr": "0.0.0.0:8080"}, "testRunner": {"localCommand": ["cargo", "test"], "dockerScript": "run.sh", "timeout": "2m"}}"#,
        )
        .unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.test_runner.local_command, vec!["cargo", "test"]);
        assert_eq!(config.test_runner.timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.storage.reports_dir, PathBuf::from("reports/quality_guard"));
    }

    #[test]
    fn test_partial_section_fills_missing_fields() {
        let config: Config = serde_json::from_str(
            r#"{"storage": {"reportsDir": "out"}, "stability": {"probeTimeout": "5s"}, "security": {"npmProgram": "pnpm"}}"#,
        )
        .unwrap();
        assert_eq!(config.storage.reports_dir, PathBuf::from("out"));
        assert_eq!(config.storage.config_dir, PathBuf::from("configs/qa_test_configs"));
        assert_eq!(config.stability.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.stability.default_check_interval, Duration::from_secs(10));
        assert_eq!(config.security.npm_program, "pnpm");
        assert_eq!(config.security.http_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_from_file_missing_is_validation_error() {
        let err = Config::from_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
