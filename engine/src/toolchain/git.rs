//! Git operations used by a release

use sdk::errors::DeployError;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{args, CommandRunner};

/// `git` in the project checkout
#[derive(Debug, Clone)]
pub struct Git {
    runner: CommandRunner,
}

impl Git {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    pub async fn current_branch(&self) -> Result<String, DeployError> {
        let output = self
            .runner
            .run_checked("git", &args(["rev-parse", "--abbrev-ref", "HEAD"]))
            .await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Release tags (those starting with `v`); empty if git is unusable
    pub async fn release_tags(&self) -> Vec<String> {
        match self.runner.run("git", &args(["tag", "--sort=-v:refname"])).await {
            Ok(output) if output.success() => parse_tags(&output.stdout),
            Ok(output) => {
                debug!(status = output.status, "git tag failed, ignoring");
                Vec::new()
            }
            Err(e) => {
                debug!(error = %e, "git tag unavailable, ignoring");
                Vec::new()
            }
        }
    }

    /// Commit `file` and push it to `publish_branch`
    ///
    /// An empty commit is tolerated. When working on another branch, the
    /// current branch is pushed as is and then also onto `publish_branch`.
    pub async fn push_file(
        &self,
        file: &Path,
        message: &str,
        publish_branch: &str,
    ) -> Result<(), DeployError> {
        let file = file.to_string_lossy().into_owned();
        self.runner.run_checked("git", &args(["add", file.as_str()])).await?;

        let commit = self.runner.run("git", &args(["commit", "-m", message])).await?;
        if !commit.success() {
            warn!(file = %file, "Nothing to commit, pushing anyway");
        }

        let branch = self.current_branch().await?;
        self.runner
            .run_checked("git", &args(["push", "origin", branch.as_str()]))
            .await?;
        info!(branch = %branch, "Pushed");

        if branch != publish_branch {
            self.runner
                .run_checked("git", &args(["fetch", "origin", publish_branch]))
                .await?;
            let refspec = format!("{}:{}", branch, publish_branch);
            self.runner
                .run_checked("git", &args(["push", "origin", refspec.as_str()]))
                .await?;
            info!(from = %branch, to = %publish_branch, "Pushed to publish branch");
        }
        Ok(())
    }
}

fn parse_tags(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|tag| tag.starts_with('v'))
        .map(str::to_string)
        .collect()
}
