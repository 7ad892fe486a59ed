//! Publishing releases with the GitHub CLI

use async_trait::async_trait;
use sdk::errors::DeployError;
use sdk::types::Version;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use super::{args, CommandRunner, Git};

/// What publishing an asset did to the release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishAction {
    /// A new release was created with the asset
    Created,
    /// The release existed; its asset was replaced
    Updated,
}

/// Release store the orchestrator publishes to
#[async_trait]
pub trait ReleasePublisher: Send + Sync {
    /// Fail early if publishing cannot work at all
    async fn ensure_ready(&self) -> Result<(), DeployError>;

    /// Tags of recent releases, for version resolution; empty on failure
    async fn release_tags(&self) -> Vec<String>;

    /// Create the release for `version` or replace its asset
    async fn publish_asset(&self, version: &Version, asset: &Path)
        -> Result<PublishAction, DeployError>;

    /// Commit and push the updated manifest
    async fn push_manifest(
        &self,
        manifest: &Path,
        version: &Version,
        checksum: &str,
    ) -> Result<(), DeployError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseListEntry {
    #[serde(default)]
    tag_name: String,
}

/// `gh` + `git` in the project checkout
#[derive(Debug, Clone)]
pub struct GitHubCliPublisher {
    runner: CommandRunner,
    git: Git,
    publish_branch: String,
}

impl GitHubCliPublisher {
    pub fn new(project_root: &Path, publish_branch: impl Into<String>) -> Self {
        let runner = CommandRunner::new(project_root);
        Self {
            git: Git::new(runner.clone()),
            runner,
            publish_branch: publish_branch.into(),
        }
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    async fn release_exists(&self, tag: &str) -> Result<bool, DeployError> {
        let output = self.runner.run("gh", &args(["release", "view", tag])).await?;
        Ok(output.success())
    }
}

/// Tag names from `gh release list --json tagName`
pub fn parse_release_list(json: &str) -> Result<Vec<String>, serde_json::Error> {
    let entries: Vec<ReleaseListEntry> = serde_json::from_str(json)?;
    Ok(entries
        .into_iter()
        .map(|e| e.tag_name)
        .filter(|tag| tag.starts_with('v'))
        .collect())
}

#[async_trait]
impl ReleasePublisher for GitHubCliPublisher {
    async fn ensure_ready(&self) -> Result<(), DeployError> {
        if self.runner.is_available("gh").await {
            Ok(())
        } else {
            Err(DeployError::MissingTool(
                "gh (GitHub CLI, https://cli.github.com/)".to_string(),
            ))
        }
    }

    async fn release_tags(&self) -> Vec<String> {
        let output = match self
            .runner
            .run("gh", &args(["release", "list", "--limit", "20", "--json", "tagName"]))
            .await
        {
            Ok(output) if output.success() => output,
            Ok(output) => {
                debug!(status = output.status, "gh release list failed, ignoring");
                return Vec::new();
            }
            Err(e) => {
                debug!(error = %e, "gh unavailable, ignoring");
                return Vec::new();
            }
        };

        parse_release_list(&output.stdout).unwrap_or_else(|e| {
            debug!(error = %e, "Unreadable gh release list, ignoring");
            Vec::new()
        })
    }

    async fn publish_asset(
        &self,
        version: &Version,
        asset: &Path,
    ) -> Result<PublishAction, DeployError> {
        let tag = version.tag();
        let asset = asset.to_string_lossy().into_owned();

        let action = if self.release_exists(&tag).await? {
            info!(tag = %tag, "Release exists, replacing asset");
            self.runner
                .run_checked(
                    "gh",
                    &args(["release", "upload", tag.as_str(), asset.as_str(), "--clobber"]),
                )
                .await
                .map_err(|e| DeployError::Publish(e.to_string()))?;
            PublishAction::Updated
        } else {
            info!(tag = %tag, "Creating release");
            let title = format!("{} - Local Build", tag);
            self.runner
                .run_checked(
                    "gh",
                    &args([
                        "release",
                        "create",
                        tag.as_str(),
                        asset.as_str(),
                        "--title",
                        title.as_str(),
                        "--notes",
                        "Automated local build deployment",
                    ]),
                )
                .await
                .map_err(|e| DeployError::Publish(e.to_string()))?;
            PublishAction::Created
        };
        Ok(action)
    }

    async fn push_manifest(
        &self,
        manifest: &Path,
        version: &Version,
        checksum: &str,
    ) -> Result<(), DeployError> {
        let message = format!("Update manifest for {} (checksum: {})", version.tag(), checksum);
        self.git
            .push_file(manifest, &message, &self.publish_branch)
            .await
            .map_err(|e| DeployError::Publish(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_release_list() {
        let json = r#"[{"tagName":"v1.0.0.3"},{"tagName":"nightly"},{"tagName":"v1.0.0.2"},{}]"#;
        assert_eq!(parse_release_list(json).unwrap(), vec!["v1.0.0.3", "v1.0.0.2"]);
    }

    #[test]
    fn test_parse_release_list_rejects_garbage() {
        assert!(parse_release_list("not json").is_err());
    }
}
