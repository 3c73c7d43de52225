//! Execution of the wrapped tool.
//!
//! The [`ProcessRunner`] trait keeps the retry loop independent of process
//! spawning; [`CommandRunner`] is the tokio-backed implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Maximum characters of captured output carried into an error message.
const ERROR_EXCERPT_CHARS: usize = 500;

/// Captured result of one process run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed or terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Short description of why this run failed.
    pub fn failure_summary(&self) -> String {
        if self.timed_out {
            return "process timed out".to_string();
        }
        let detail = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        let detail: String = detail.chars().take(ERROR_EXCERPT_CHARS).collect();
        match (self.exit_code, detail.is_empty()) {
            (Some(0), true) => "process produced no output".to_string(),
            (Some(code), true) => format!("process exited with status {}", code),
            (None, true) => "process terminated by signal".to_string(),
            (Some(code), false) => format!("exit status {}: {}", code, detail),
            (None, false) => format!("terminated by signal: {}", detail),
        }
    }
}

/// Runs the wrapped tool once with the given input.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Spawn failures are returned as errors; everything after spawning is
    /// reported through [`ProcessOutput`].
    async fn run(&self, input: &str, timeout: Duration) -> Result<ProcessOutput>;
}

/// Runs `command args... input` as a child process.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    command: String,
    args: Vec<String>,
}

impl CommandRunner {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

#[async_trait]
impl ProcessRunner for CommandRunner {
    async fn run(&self, input: &str, timeout: Duration) -> Result<ProcessOutput> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .with_context(|| format!("Failed to spawn {} process", self.command))?;

        // Dropping the pending future on timeout drops the child, which kills it.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ProcessOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                timed_out: false,
            }),
            Ok(Err(e)) => {
                Err(e).with_context(|| format!("Failed to wait for {} process", self.command))
            }
            Err(_) => {
                tracing::warn!("{} exceeded timeout of {:?}, killed", self.command, timeout);
                Ok(ProcessOutput {
                    exit_code: None,
                    timed_out: true,
                    ..ProcessOutput::default()
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_summary() {
        let out = ProcessOutput {
            exit_code: Some(1),
            stderr: "  boom \n".to_string(),
            ..ProcessOutput::default()
        };
        assert_eq!(out.failure_summary(), "exit status 1: boom");

        let out = ProcessOutput {
            exit_code: Some(3),
            ..ProcessOutput::default()
        };
        assert_eq!(out.failure_summary(), "process exited with status 3");

        let out = ProcessOutput {
            timed_out: true,
            ..ProcessOutput::default()
        };
        assert_eq!(out.failure_summary(), "process timed out");
        assert!(!out.succeeded());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_runner_captures_output() {
        let runner = CommandRunner::new(
            "sh",
            vec!["-c".to_string(), "echo \"got: $0\"; echo warn >&2".to_string()],
        );
        let out = runner.run("hello", Duration::from_secs(10)).await.unwrap();
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.stdout.trim(), "got: hello");
        assert_eq!(out.stderr.trim(), "warn");
        assert!(out.succeeded());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_runner_non_zero_exit() {
        let runner = CommandRunner::new(
            "sh",
            vec!["-c".to_string(), "echo 'quota exceeded' >&2; exit 7".to_string()],
        );
        let out = runner.run("x", Duration::from_secs(10)).await.unwrap();
        assert_eq!(out.exit_code, Some(7));
        assert!(out.stderr.contains("quota exceeded"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_runner_kills_on_timeout() {
        let runner = CommandRunner::new("sh", vec!["-c".to_string(), "sleep 10".to_string()]);
        let started = std::time::Instant::now();
        let out = runner.run("x", Duration::from_millis(200)).await.unwrap();
        assert!(out.timed_out);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_command_runner_spawn_failure() {
        let runner = CommandRunner::new("definitely-not-a-real-binary-xyz", Vec::new());
        assert!(runner.run("x", Duration::from_secs(1)).await.is_err());
    }
}
