//! External process runner shared by the tool adapters.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use clusterproof_core::error::ToolError;

/// Captured output of a successful run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// One invocation of an external tool.
///
/// `tool` is the short name used in errors and logs (`terraform`), while
/// `program` is what actually gets spawned (a configured path or a name
/// looked up on `PATH`).
#[derive(Debug, Clone)]
pub struct ToolCommand {
    tool: String,
    program: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(tool: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            program: program.into(),
            args: Vec::new(),
            dir: None,
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

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Command line as it would be typed, for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion, capturing stdout and stderr.
    ///
    /// `action` names the step in errors (`apply`, `build`, ...).
    ///
    /// # Errors
    ///
    /// - [`ToolError::Spawn`] when the program cannot be started
    /// - [`ToolError::Failed`] when it exits unsuccessfully
    pub async fn run(&self, action: &str) -> Result<ToolOutput, ToolError> {
        debug!(tool = %self.tool, action, command = %self.display(), "running tool");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await.map_err(|e| ToolError::Spawn {
            tool: self.tool.clone(),
            reason: format!("{}: {e}", self.program),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            warn!(tool = %self.tool, action, status = %output.status, "tool failed");
            return Err(ToolError::Failed {
                tool: self.tool.clone(),
                action: action.to_owned(),
                status: output.status.to_string(),
                stderr: stderr.trim().to_owned(),
            });
        }

        debug!(tool = %self.tool, action, stdout_bytes = stdout.len(), "tool succeeded");
        Ok(ToolOutput { stdout, stderr })
    }
}
