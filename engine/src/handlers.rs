//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - build: build the package and print manual install instructions
//! - deploy: build, then install from an already published manifest
//! - release: build, publish, deploy and verify
//! - next-version: print the resolved next version
//! - status: show the installed plugin on the server

use anyhow::{Context, Result};
use jellyship_release::{Artifact, ManifestStore, ReleaseCoordinates};
use sdk::types::Version;
use serde_json::json;
use tracing::{info, warn};

use crate::cdn::{CdnVerifier, HttpProbe};
use crate::config::Config;
use crate::history::resolve_next_version;
use crate::host::{HostClient, PluginHost, PluginSelector};
use crate::orchestrator::{DeployReport, DeploymentOrchestrator, ReleaseTarget};
use crate::poller::Poller;
use crate::toolchain::{GitHubCliPublisher, PluginBuilder};

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

fn publisher(config: &Config) -> GitHubCliPublisher {
    GitHubCliPublisher::new(&config.core.project_root, &config.release.publish_branch)
}

fn store(config: &Config) -> ManifestStore {
    ManifestStore::new(config.manifest_path())
}

fn plugin_selector(config: &Config) -> PluginSelector {
    let selector = PluginSelector::named(&config.project.plugin_name);
    match &config.project.plugin_guid {
        Some(guid) => selector.with_guid(guid),
        None => selector,
    }
}

fn release_target(config: &Config) -> Result<ReleaseTarget> {
    Ok(ReleaseTarget {
        plugin: plugin_selector(config),
        package: config.project.plugin_name.clone(),
        repository_name: config.repository_name().to_string(),
        manifest_url: config.release.manifest_url()?,
        coordinates: ReleaseCoordinates::new(
            &config.project.product,
            config.release.download_base()?,
        ),
        target_abi: config.project.target_abi.clone(),
        changelog: config.project.changelog.clone(),
    })
}

type Orchestrator = DeploymentOrchestrator<HostClient, GitHubCliPublisher, HttpProbe>;

/// Fails on missing credentials before anything is built
fn orchestrator(config: &Config) -> Result<Orchestrator> {
    let host = HostClient::new(config.host_settings()?).context("Failed to create host client")?;
    let verifier = CdnVerifier::new(HttpProbe::new()?, Poller::new(config.poll_interval()));
    Ok(DeploymentOrchestrator::new(
        host,
        publisher(config),
        verifier,
        store(config),
        release_target(config)?,
    )
    .with_timeouts(config.deploy_timeouts()))
}

async fn resolve_version(explicit: Option<Version>, config: &Config) -> Result<Version> {
    match explicit {
        Some(version) => Ok(version),
        None => {
            let publisher = publisher(config);
            let version = resolve_next_version(publisher.git(), &publisher, &store(config))
                .await
                .context("Failed to resolve the next version")?;
            info!(version = %version, "Auto-detected next version");
            Ok(version)
        }
    }
}

async fn build_artifact(config: &Config, version: &Version) -> Result<Artifact> {
    // The download base is only needed for URLs; building works without it
    let coordinates = ReleaseCoordinates::new(
        &config.project.product,
        config.release.download_base().unwrap_or_default(),
    );
    let builder = PluginBuilder::new(
        &config.core.project_root,
        config.build.command.clone(),
        config.build.version_files.clone(),
        &config.build.artifact_dir,
        coordinates,
    )?;
    let artifact = builder
        .build(version)
        .await
        .with_context(|| format!("Failed to build version {}", version))?;
    Ok(artifact)
}

/// Lines telling the user how to install a build by hand
pub fn manual_instructions(artifact: &Artifact, repository_url: Option<&str>) -> Vec<String> {
    let version = artifact.version;
    let mut lines = vec!["To install on the server:".to_string()];
    if let Some(url) = repository_url {
        lines.push(format!("1. Add repository: {}", url));
    } else {
        lines.push("1. Add your plugin repository manifest URL on the server".to_string());
    }
    lines.push(format!(
        "2. Or extract {} into the server's plugins directory",
        artifact.path.display()
    ));
    lines.push(format!(
        "3. Or run: jellyship deploy {}   (install from the published manifest)",
        version
    ));
    lines.push(format!("4. Or run: jellyship release {}  (publish and deploy)", version));
    lines.push(String::new());
    lines.push(format!("Update the manifest checksum to: {}", artifact.checksum));
    lines
}

fn print_report(report: &DeployReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!();
            for line in report.summary_lines() {
                println!("{}", line);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }
    Ok(())
}

/// Build the package without touching the server
pub async fn handle_build(
    version: Option<Version>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let version = resolve_version(version, config).await?;
    let artifact = build_artifact(config, &version).await?;
    let repository_url = config
        .release
        .branch_manifest_url(&config.release.publish_branch)
        .ok();

    match format {
        OutputFormat::Text => {
            println!("Build complete");
            println!("  Package:  {}", artifact.path.display());
            println!("  Checksum: {}", artifact.checksum);
            println!();
            for line in manual_instructions(&artifact, repository_url.as_deref()) {
                println!("{}", line);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "version": artifact.version.to_string(),
                "package": artifact.path,
                "checksum": artifact.checksum,
                "repository_url": repository_url,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Build, then install from the manifest already published on a branch
pub async fn handle_deploy(
    version: Option<Version>,
    branch: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let mut orchestrator = orchestrator(config)?;

    let version = resolve_version(version, config).await?;
    build_artifact(config, &version).await?;

    let branch = match branch {
        Some(branch) => branch,
        None => match orchestrator.publisher().git().current_branch().await {
            Ok(branch) => branch,
            Err(e) => {
                warn!(error = %e, "Cannot determine current branch, using publish branch");
                config.release.publish_branch.clone()
            }
        },
    };
    let repository_url = config.release.branch_manifest_url(&branch)?;
    info!(branch = %branch, url = %repository_url, "Using manifest from branch");

    let report = orchestrator
        .deploy_from_repository(&version, &repository_url)
        .await?;
    print_report(&report, format)?;

    if format == OutputFormat::Text {
        if let Some(url) = &config.host.url {
            println!(
                "The server is restarting. Check {}/web/index.html#!/dashboard/plugins for status.",
                url.trim_end_matches('/')
            );
        }
    }
    Ok(())
}

/// Full release: build, publish, deploy and verify
pub async fn handle_release(
    version: Option<Version>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let mut orchestrator = orchestrator(config)?;
    orchestrator.preflight().await?;

    let version = resolve_version(version, config).await?;
    let artifact = build_artifact(config, &version).await?;

    let report = orchestrator
        .release(&artifact)
        .await
        .with_context(|| format!("Release of version {} failed", version))?;
    print_report(&report, format)?;

    if !report.passed() {
        warn!(version = %version, "Deployment finished but could not be verified");
    }
    Ok(())
}

pub async fn handle_next_version(config: &Config, format: OutputFormat) -> Result<()> {
    let version = resolve_version(None, config).await?;
    match format {
        OutputFormat::Text => println!("{}", version),
        OutputFormat::Json => {
            let output = json!({ "version": version.to_string(), "tag": version.tag() });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Show the plugin as the server reports it
pub async fn handle_status(config: &Config, format: OutputFormat) -> Result<()> {
    let host = HostClient::connect(config.host_settings()?)
        .await
        .context("Failed to connect to the server")?;
    let plugin = host.find_plugin(&plugin_selector(config)).await?;

    match format {
        OutputFormat::Text => match &plugin {
            Some(plugin) => println!(
                "{} v{} ({}) id {}",
                plugin.name, plugin.version, plugin.status, plugin.id
            ),
            None => println!("{} is not installed", config.project.plugin_name),
        },
        OutputFormat::Json => {
            let output = json!({ "installed": plugin });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn artifact() -> Artifact {
        Artifact {
            path: PathBuf::from("tunnelfin_1.0.0.4.zip"),
            version: Version::new(1, 0, 0, 4),
            checksum: "9e107d9d372bb6826bd81d3542a419d6".to_string(),
        }
    }

    #[test]
    fn test_manual_instructions_with_repository() {
        let lines = manual_instructions(
            &artifact(),
            Some("https://cdn.jsdelivr.net/gh/o/r@main/manifest.json"),
        );
        assert_eq!(
            lines[1],
            "1. Add repository: https://cdn.jsdelivr.net/gh/o/r@main/manifest.json"
        );
        assert!(lines[3].contains("jellyship deploy 1.0.0.4"));
        assert!(lines[4].contains("jellyship release 1.0.0.4"));
        assert_eq!(
            lines.last().unwrap(),
            "Update the manifest checksum to: 9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn test_manual_instructions_without_repository() {
        let lines = manual_instructions(&artifact(), None);
        assert!(lines[1].contains("manifest URL"));
    }

    #[test]
    fn test_release_target_from_config() {
        let mut config = Config::default();
        config.release.owner = "owner".to_string();
        config.release.repo = "repo".to_string();
        config.project.plugin_guid = Some("abc".to_string());

        let target = release_target(&config).unwrap();
        assert_eq!(target.package, "TunnelFin");
        assert_eq!(target.plugin.guid.as_deref(), Some("abc"));
        assert_eq!(
            target.coordinates.asset_url(&Version::new(1, 0, 0, 4)),
            "https://github.com/owner/repo/releases/download/v1.0.0.4/tunnelfin_1.0.0.4.zip"
        );
    }

    #[test]
    fn test_orchestrator_requires_credentials() {
        let mut config = Config::default();
        config.release.owner = "owner".to_string();
        config.release.repo = "repo".to_string();

        let err = orchestrator(&config).err().unwrap();
        assert!(err.to_string().contains("Missing credentials"));
    }
}
