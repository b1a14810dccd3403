//! Scoped subprocesses.
//!
//! Every external tool runs as a child owned by the future that awaits it.
//! Children are spawned with `kill_on_drop`, so dropping the future (a
//! cancelled pass, a failed sibling, Ctrl-C) terminates the process.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

use crate::build::TaskError;

/// A command line to run.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    /// Tool name used in error messages
    tool: String,
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
}

impl ToolCommand {
    /// Create a command.
    pub fn new(tool: impl Into<String>, program: impl Into<OsString>) -> Self {
        Self { tool: tool.into(), program: program.into(), args: Vec::new(), cwd: None }
    }

    /// Build a command from a full argv (`argv[0]` is the program).
    pub fn from_argv(tool: impl Into<String>, argv: &[String]) -> Result<Self, TaskError> {
        let tool = tool.into();
        let Some((program, args)) = argv.split_first() else {
            return Err(TaskError::tool(tool, "no command configured"));
        };
        Ok(Self::new(tool, program).args(args))
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Tool name.
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Run to completion, capturing output.
    ///
    /// Only a failure to start the process is an error here; the exit status
    /// is for the caller to interpret.
    pub async fn output(&self) -> Result<ToolOutput, TaskError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args).stdin(Stdio::null()).kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        tracing::debug!(tool = %self.tool, program = ?self.program, args = ?self.args, "spawning");
        let output = command.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TaskError::tool(
                    &self.tool,
                    format!("'{}' not found on PATH", self.program.to_string_lossy()),
                )
            } else {
                TaskError::tool(&self.tool, format!("failed to start: {}", e))
            }
        })?;

        Ok(ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run with inherited stdio, for interactive tools (lint, format).
    pub async fn status(&self) -> Result<ExitStatus, TaskError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        let mut child = command
            .spawn()
            .map_err(|e| TaskError::tool(&self.tool, format!("failed to start: {}", e)))?;
        child.wait().await.map_err(|e| TaskError::tool(&self.tool, e.to_string()))
    }
}

/// Captured result of a finished tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit status
    pub status: ExitStatus,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the tool exited with status 0.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Non-empty stderr lines, for warnings.
    pub fn stderr_lines(&self) -> Vec<String> {
        self.stderr.lines().map(str::trim_end).filter(|l| !l.is_empty()).map(String::from).collect()
    }
}
