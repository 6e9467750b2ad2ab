//! Typed process launch abstraction.

use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

/// Maximum number of stderr bytes kept when summarising a failure.
const STDERR_TAIL_BYTES: usize = 512;

/// Error type for process launch operations.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Empty command: no program given")]
    EmptyProgram,
}

/// A fully rendered external command: program plus argv.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to execute (resolved through `PATH`).
    pub program: String,
    /// Arguments, one element per argv entry.
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Creates a command with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Result of running an external process to completion.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    /// Standard output captured.
    pub stdout: String,
    /// Standard error captured.
    pub stderr: String,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl ProcessOutput {
    /// Creates a new process output.
    pub fn new(exit_code: i32, stdout: String, stderr: String, duration: Duration) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            duration,
        }
    }

    /// Checks if the process exited with status zero.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the last few hundred bytes of stderr, trimmed.
    pub fn stderr_tail(&self) -> &str {
        let trimmed = self.stderr.trim_end();
        if trimmed.len() <= STDERR_TAIL_BYTES {
            return trimmed;
        }
        let mut start = trimmed.len() - STDERR_TAIL_BYTES;
        while !trimmed.is_char_boundary(start) {
            start += 1;
        }
        &trimmed[start..]
    }

    /// One-line description of a non-zero exit, used in error reasons.
    pub fn failure_reason(&self) -> String {
        let tail = self.stderr_tail();
        if tail.is_empty() {
            format!("exited with status {}", self.exit_code)
        } else {
            format!("exited with status {}: {}", self.exit_code, tail)
        }
    }
}

/// Trait for launching external processes.
///
/// The orchestrator and merge/count collaborators only depend on this trait,
/// so tests can substitute a recording implementation.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Runs the command to completion and captures its output.
    async fn launch(&self, spec: &CommandSpec) -> Result<ProcessOutput, LaunchError>;
}

/// Launches real child processes with `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessLauncher for SystemLauncher {
    async fn launch(&self, spec: &CommandSpec) -> Result<ProcessOutput, LaunchError> {
        if spec.program.is_empty() {
            return Err(LaunchError::EmptyProgram);
        }

        let start = Instant::now();
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!(command = %spec, "Spawning external process");

        let output = cmd.output().await.map_err(|e| LaunchError::Spawn {
            program: spec.program.clone(),
            source: e,
        })?;

        let exit_code = output.status.code().unwrap_or(-1);
        let duration = start.elapsed();

        debug!(
            program = %spec.program,
            exit_code = exit_code,
            duration_ms = duration.as_millis() as u64,
            "External process finished"
        );

        Ok(ProcessOutput::new(
            exit_code,
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
            duration,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_display() {
        let spec = CommandSpec::new("hadd").with_args(["-f", "out.root"]).arg("in 1.root");
        assert_eq!(spec.to_string(), "hadd -f out.root in 1.root");
        assert_eq!(spec.args.len(), 3);
        assert_eq!(spec.args[2], "in 1.root");
    }

    #[test]
    fn test_failure_reason_includes_stderr_tail() {
        let output = ProcessOutput::new(
            2,
            String::new(),
            "fatal: tree 'events' not found\n".to_string(),
            Duration::ZERO,
        );
        assert!(!output.is_success());
        assert_eq!(
            output.failure_reason(),
            "exited with status 2: fatal: tree 'events' not found"
        );

        let quiet = ProcessOutput::new(1, String::new(), String::new(), Duration::ZERO);
        assert_eq!(quiet.failure_reason(), "exited with status 1");
    }

    #[test]
    fn test_stderr_tail_truncates() {
        let long = "x".repeat(STDERR_TAIL_BYTES * 2);
        let output = ProcessOutput::new(1, String::new(), long, Duration::ZERO);
        assert_eq!(output.stderr_tail().len(), STDERR_TAIL_BYTES);
    }

    #[tokio::test]
    async fn test_system_launcher_captures_exit_code() {
        let launcher = SystemLauncher::new();

        let ok = launcher
            .launch(&CommandSpec::new("sh").with_args(["-c", "echo hello"]))
            .await
            .unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.stdout.trim(), "hello");

        let failed = launcher
            .launch(&CommandSpec::new("sh").with_args(["-c", "echo boom >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(failed.exit_code, 3);
        assert_eq!(failed.stderr_tail(), "boom");
    }

    #[tokio::test]
    async fn test_system_launcher_spawn_error() {
        let launcher = SystemLauncher::new();
        let result = launcher
            .launch(&CommandSpec::new("definitely-not-a-real-program-xyz"))
            .await;
        assert!(matches!(result, Err(LaunchError::Spawn { .. })));

        let result = launcher.launch(&CommandSpec::new("")).await;
        assert!(matches!(result, Err(LaunchError::EmptyProgram)));
    }
}
