//! External tool invocation
//!
//! The build command, `git` and `gh` are run as child processes, execve
//! style: no shell, stdin closed, stdout/stderr captured. Only programs on
//! the runner's allowlist can be started.

pub mod build;
pub mod git;
pub mod github;

use sdk::errors::DeployError;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

pub use build::PluginBuilder;
pub use git::Git;
pub use github::{GitHubCliPublisher, PublishAction, ReleasePublisher};

/// Captured result of a finished child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs allowlisted programs in a fixed working directory
#[derive(Debug, Clone)]
pub struct CommandRunner {
    work_dir: PathBuf,
    allowlist: HashSet<String>,
}

impl CommandRunner {
    /// Runner allowing `git` and `gh`
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self::with_allowlist(work_dir, ["git", "gh"])
    }

    pub fn with_allowlist<I, S>(work_dir: impl Into<PathBuf>, programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            work_dir: work_dir.into(),
            allowlist: programs.into_iter().map(Into::into).collect(),
        }
    }

    /// Run to completion. A non-zero exit is returned, not raised.
    pub async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, DeployError> {
        if !self.allowlist.contains(program) {
            return Err(DeployError::Config(format!(
                "program '{}' is not allowed",
                program
            )));
        }

        debug!(program = %program, args = ?args, "Running command");
        let output = Command::new(program)
            .args(args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => DeployError::MissingTool(program.to_string()),
                _ => DeployError::Io(e),
            })?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run and fail with [`DeployError::CommandFailed`] on non-zero exit
    pub async fn run_checked(
        &self,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput, DeployError> {
        let output = self.run(program, args).await?;
        if !output.success() {
            return Err(DeployError::CommandFailed {
                command: display_command(program, args),
                status: output.status,
                stderr: tail(&output.stderr, 20),
            });
        }
        Ok(output)
    }

    /// Whether `program --version` can be started at all
    pub async fn is_available(&self, program: &str) -> bool {
        self.run(program, &["--version".to_string()])
            .await
            .map(|o| o.success())
            .unwrap_or(false)
    }
}

/// Shorthand for building argument vectors from literals
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

fn display_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Last `lines` lines of command output
pub fn tail(output: &str, lines: usize) -> String {
    let all: Vec<&str> = output.trim_end().lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
