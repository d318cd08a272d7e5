//! External command execution.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ForgeError, Result};

/// A command to run.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
    /// Written to the child's stdin, then stdin is closed.
    pub stdin: Option<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// Result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub program: String,

    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,

    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout and stderr joined, trimmed.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.trim().to_string();
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stderr);
        }
        text
    }
}

/// Runs external commands with an optional timeout.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout_secs: u64,
}

impl CommandRunner {
    /// `timeout_secs == 0` waits forever.
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    /// Run a command and return its output whatever the exit code.
    pub async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let start = Instant::now();
        debug!(program = %spec.program, args = ?spec.args, "Running command");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| ForgeError::Command {
            program: spec.program.clone(),
            message: e.to_string(),
        })?;

        if let (Some(input), Some(mut stdin)) = (&spec.stdin, child.stdin.take()) {
            // A child may exit without reading its input; its exit status decides.
            match stdin.write_all(input.as_bytes()).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!(program = %spec.program, "Command closed stdin early");
                }
                Err(e) => return Err(e.into()),
            }
            drop(stdin);
        }

        let output = if self.timeout_secs > 0 {
            tokio::time::timeout(Duration::from_secs(self.timeout_secs), child.wait_with_output())
                .await
                .map_err(|_| ForgeError::Timeout {
                    program: spec.program.clone(),
                    secs: self.timeout_secs,
                })??
        } else {
            child.wait_with_output().await?
        };

        let result = CommandOutput {
            program: spec.program.clone(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!(
            program = %result.program,
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            "Command finished"
        );
        Ok(result)
    }

    /// Run a command, failing on a non-zero exit. Returns trimmed stdout.
    pub async fn run_checked(&self, spec: &CommandSpec) -> Result<String> {
        let output = self.run(spec).await?;
        if !output.success() {
            return Err(ForgeError::CommandFailed {
                program: output.program,
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output.stdout.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_joins_streams() {
        let output = CommandOutput {
            program: "go".to_string(),
            exit_code: 1,
            stdout: "first\n".to_string(),
            stderr: "  second\n".to_string(),
            duration_ms: 3,
        };
        assert_eq!(output.combined(), "first\nsecond");
        assert!(!output.success());
    }

    #[tokio::test]
    async fn runs_simple_command() {
        let runner = CommandRunner::new(60);
        let output = runner
            .run(&CommandSpec::new("echo", ["hello"]))
            .await
            .expect("echo failed");
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn failing_command_is_not_an_error_for_run() {
        let runner = CommandRunner::new(60);
        let output = runner.run(&CommandSpec::new("false", Vec::<String>::new())).await.unwrap();
        assert_ne!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn run_checked_reports_exit_code() {
        let runner = CommandRunner::new(60);
        let err = runner
            .run_checked(&CommandSpec::new("false", Vec::<String>::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::CommandFailed { exit_code, .. } if exit_code != 0));
    }

    #[tokio::test]
    async fn missing_program_is_command_error() {
        let runner = CommandRunner::new(60);
        let err = runner
            .run(&CommandSpec::new("forge-no-such-binary", Vec::<String>::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Command { .. }));
    }

    #[tokio::test]
    async fn stdin_is_forwarded() {
        let runner = CommandRunner::new(60);
        let out = runner
            .run_checked(&CommandSpec::new("cat", Vec::<String>::new()).stdin("token-value"))
            .await
            .unwrap();
        assert_eq!(out, "token-value");
    }

    #[tokio::test]
    async fn unread_stdin_reports_exit_status() {
        let runner = CommandRunner::new(60);
        let input = "x".repeat(1 << 20);
        let err = runner
            .run_checked(&CommandSpec::new("sh", ["-c", "echo 'login denied' >&2; exit 3"]).stdin(input))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ForgeError::CommandFailed { exit_code: 3, ref stderr, .. } if stderr == "login denied"),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn timeout_is_enforced() {
        let runner = CommandRunner::new(1);
        let err = runner.run(&CommandSpec::new("sleep", ["5"])).await.unwrap_err();
        assert!(matches!(err, ForgeError::Timeout { secs: 1, .. }));
    }
}
