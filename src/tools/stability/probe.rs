//! Health probes for monitored targets.
//!
//! A target string resolves to exactly one probe kind:
//! - `http://` / `https://` URL: GET, healthy on 2xx;
//! - `component::operation` registered in the operation registry;
//! - path of an existing file: executed, healthy on exit code 0.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::process::{self, CommandSpec};
use crate::tools::operations::{Operation, OperationRegistry};
use crate::types::{Error, Result};

/// Result of one probe call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub healthy: bool,
    /// Failure reason or status line.
    pub detail: Option<String>,
    /// Warning lines surfaced by the target while probing.
    pub warnings: Vec<String>,
}

impl ProbeOutcome {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: Some(detail.into()),
            warnings: Vec::new(),
        }
    }
}

/// One health check against a monitored target.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self) -> ProbeOutcome;
}

/// Resolve `target` into a probe.
pub fn resolve_probe(
    target: &str,
    operations: &OperationRegistry,
    timeout: Duration,
) -> Result<Box<dyn Probe>> {
    if target.starts_with("http://") || target.starts_with("https://") {
        return Ok(Box::new(HttpProbe::new(target, timeout)?));
    }
    if target.contains("::") {
        let operation = operations.resolve_key(target).map_err(|_| {
            Error::validation(format!("operation '{}' is not registered", target))
        })?;
        return Ok(Box::new(OperationProbe { operation }));
    }
    let path = Path::new(target);
    if path.is_file() {
        return Ok(Box::new(CommandProbe {
            path: path.to_path_buf(),
            timeout,
        }));
    }
    Err(Error::validation(format!(
        "cannot resolve target '{}': expected an http(s) URL, a registered component::operation or an existing script path",
        target
    )))
}

// =============================================================================
// HTTP
// =============================================================================

#[derive(Debug)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self) -> ProbeOutcome {
        match self.client.get(&self.url).send().await {
            Ok(resp) if resp.status().is_success() => ProbeOutcome::healthy(),
            Ok(resp) => ProbeOutcome::unhealthy(format!("GET {} returned {}", self.url, resp.status())),
            Err(e) => ProbeOutcome::unhealthy(format!("GET {} failed: {}", self.url, e)),
        }
    }
}

// =============================================================================
// Operation
// =============================================================================

pub struct OperationProbe {
    operation: Arc<dyn Operation>,
}

impl std::fmt::Debug for OperationProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationProbe").finish_non_exhaustive()
    }
}

#[async_trait]
impl Probe for OperationProbe {
    async fn check(&self) -> ProbeOutcome {
        match self.operation.invoke(&Value::Null).await {
            Ok(_) => ProbeOutcome::healthy(),
            Err(e) => ProbeOutcome::unhealthy(e.to_string()),
        }
    }
}

// =============================================================================
// Command
// =============================================================================

#[derive(Debug)]
pub struct CommandProbe {
    path: PathBuf,
    timeout: Duration,
}

#[async_trait]
impl Probe for CommandProbe {
    async fn check(&self) -> ProbeOutcome {
        let spec = CommandSpec::new(self.path.to_string_lossy());
        let output = match process::run_captured(&spec, Some(self.timeout)).await {
            Ok(output) => output,
            Err(e) => return ProbeOutcome::unhealthy(e.to_string()),
        };
        let warnings = output
            .stdout
            .lines()
            .chain(output.stderr.lines())
            .filter(|l| l.to_ascii_lowercase().contains("warn"))
            .map(|l| l.trim().to_string())
            .collect();
        ProbeOutcome {
            healthy: output.succeeded(),
            detail: (!output.succeeded()).then(|| {
                format!("'{}' exited with code {}", spec.display(), output.exit_code())
            }),
            warnings,
        }
    }
}
