//! Subprocess execution with incremental output capture.
//!
//! A run moves through `Spawned → Streaming → Exited | Errored`. Stdout and
//! stderr are drained concurrently into owned buffers as chunks arrive; the
//! buffers are only converted to text once the run reaches a terminal phase.

use bytes::BytesMut;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use crate::types::{Error, Result};

/// Exit code reported when no code is available (signal, spawn failure).
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// What to run.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Lifecycle phase of a captured run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessPhase {
    Spawned,
    Streaming,
    Exited { code: i32 },
    Errored { reason: String },
}

/// Finalized output of a run that reached a terminal phase.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub phase: ProcessPhase,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn exit_code(&self) -> i32 {
        match self.phase {
            ProcessPhase::Exited { code } => code,
            _ => UNKNOWN_EXIT_CODE,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.phase == ProcessPhase::Exited { code: 0 }
    }
}

/// In-flight run state: phase plus the growable output buffers.
#[derive(Debug)]
struct Capture {
    phase: ProcessPhase,
    stdout: BytesMut,
    stderr: BytesMut,
}

impl Capture {
    fn new() -> Self {
        Self {
            phase: ProcessPhase::Spawned,
            stdout: BytesMut::with_capacity(8 * 1024),
            stderr: BytesMut::with_capacity(1024),
        }
    }

    fn transition(&mut self, next: ProcessPhase) {
        tracing::trace!("process phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    fn finish(self) -> ProcessOutput {
        ProcessOutput {
            phase: self.phase,
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
        }
    }
}

/// Spawn `spec` and capture its output until it exits.
///
/// Returns `Err(Error::Process)` when the program cannot be launched. A run
/// that started but could not be observed to completion (wait failure,
/// timeout) comes back as `Ok` with an `Errored` phase and whatever output was
/// captured so far.
pub async fn run_captured(spec: &CommandSpec, timeout: Option<Duration>) -> Result<ProcessOutput> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.cwd {
        command.current_dir(dir);
    }

    let mut child = command
        .spawn()
        .map_err(|e| Error::process(format!("failed to spawn '{}': {}", spec.display(), e)))?;
    tracing::debug!("spawned '{}' (pid={:?})", spec.display(), child.id());

    let mut capture = Capture::new();

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, drive(&mut child, &mut capture)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                tracing::warn!(
                    "'{}' exceeded {}s, killing",
                    spec.display(),
                    limit.as_secs()
                );
                if let Err(e) = child.kill().await {
                    tracing::warn!("failed to kill '{}': {}", spec.display(), e);
                }
                Err(Error::timeout(format!(
                    "'{}' did not finish within {}s",
                    spec.display(),
                    limit.as_secs()
                )))
            }
        },
        None => drive(&mut child, &mut capture).await,
    };

    match outcome {
        Ok(code) => capture.transition(ProcessPhase::Exited { code }),
        Err(e) => capture.transition(ProcessPhase::Errored {
            reason: e.to_string(),
        }),
    }
    Ok(capture.finish())
}

/// Drain both pipes, then reap the child.
async fn drive(child: &mut Child, capture: &mut Capture) -> Result<i32> {
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::process("stdout pipe unavailable"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::process("stderr pipe unavailable"))?;

    capture.transition(ProcessPhase::Streaming);

    let mut stdout_open = true;
    let mut stderr_open = true;
    while stdout_open || stderr_open {
        tokio::select! {
            read = stdout.read_buf(&mut capture.stdout), if stdout_open => {
                stdout_open = chunk_arrived("stdout", read);
            }
            read = stderr.read_buf(&mut capture.stderr), if stderr_open => {
                stderr_open = chunk_arrived("stderr", read);
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| Error::process(format!("failed to wait for child: {}", e)))?;
    Ok(status.code().unwrap_or(UNKNOWN_EXIT_CODE))
}

/// Returns whether the stream is still open.
fn chunk_arrived(stream: &str, read: std::io::Result<usize>) -> bool {
    match read {
        Ok(0) => false,
        Ok(n) => {
            tracing::trace!("{}: {} bytes", stream, n);
            true
        }
        Err(e) => {
            tracing::warn!("{} read failed: {}", stream, e);
            false
        }
    }
}
