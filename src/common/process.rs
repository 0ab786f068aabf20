//! External command execution.
//!
//! Every package manager, installer and probe runs through [`CommandRunner`]
//! so the engine can be driven by a fake in tests.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use super::shell::join_command;
use crate::ui::prelude::*;

/// A program plus arguments, never interpreted by a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// `sudo <program> <args…>`
    pub fn sudo(program: impl Into<String>) -> Self {
        Self::new("sudo").arg(program)
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

    /// Shell-quoted form used in logs and dry runs.
    pub fn command_line(&self) -> String {
        join_command(&self.program, &self.args)
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.command_line())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("`{command}` exited with {}{}", exit_label(.code), detail_suffix(.detail))]
    Failed {
        command: String,
        code: Option<i32>,
        detail: String,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {}", c),
        None => "a signal".to_string(),
    }
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {}", detail)
    }
}

/// Keep the last few non-empty lines of tool output for error messages.
fn tail_lines(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join(" | ")
}

impl CommandError {
    pub fn failed(cmd: &CommandSpec, output: &CommandOutput) -> Self {
        let source = if output.stderr.trim().is_empty() {
            &output.stdout
        } else {
            &output.stderr
        };
        CommandError::Failed {
            command: cmd.command_line(),
            code: output.code,
            detail: tail_lines(source, 3),
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture output. A nonzero exit is not an error here.
    async fn output(&self, cmd: &CommandSpec) -> Result<CommandOutput, CommandError>;

    /// Whether an executable with this name is on `PATH`.
    fn command_exists(&self, name: &str) -> bool;

    /// Run to completion, treating a nonzero exit as [`CommandError::Failed`].
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let output = self.output(cmd).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(CommandError::failed(cmd, &output))
        }
    }
}

/// Runs real processes with tokio, bounded by a per-command timeout.
///
/// Children are killed when their future is dropped, so cancelling an install
/// task (Ctrl-C, timeout) never leaves an orphaned package manager behind.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(&self, cmd: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let command_line = cmd.command_line();
        emit(Level::Debug, "process.spawn", &format!("$ {}", command_line), None);

        let child = TokioCommand::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(CommandError::Spawn {
                    command: command_line,
                    source,
                });
            }
            Err(_) => {
                return Err(CommandError::Timeout {
                    command: command_line,
                    timeout: self.timeout,
                });
            }
        };

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn command_exists(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }
}
