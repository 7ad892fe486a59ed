//! Plugin build step
//!
//! Stamps the version into the project files, clears stale packages, runs
//! the configured build command and checksums the resulting zip. The zip is
//! read once; its checksum is the one every later step uses.

use jellyship_release::verifier::checksum_file;
use jellyship_release::{Artifact, ReleaseCoordinates};
use regex::Regex;
use sdk::errors::DeployError;
use sdk::types::Version;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{tail, CommandRunner};

/// Placeholder in the build command replaced by the version
pub const VERSION_PLACEHOLDER: &str = "{version}";

/// Elements whose content is replaced when stamping a version
const VERSION_ELEMENTS: [&str; 3] = ["Version", "AssemblyVersion", "FileVersion"];

/// Replace the contents of the version elements in a project file
pub fn stamp_version(contents: &str, version: &Version) -> Result<String, DeployError> {
    let mut stamped = contents.to_string();
    for element in VERSION_ELEMENTS {
        let pattern = Regex::new(&format!(r"<{0}>[^<]+</{0}>", element))
            .map_err(|e| DeployError::Build(e.to_string()))?;
        let replacement = format!("<{0}>{1}</{0}>", element, version);
        stamped = pattern
            .replace_all(&stamped, regex::NoExpand(&replacement))
            .into_owned();
    }
    Ok(stamped)
}

/// Substitute the version into every argument of the build command
pub fn expand_command(command: &[String], version: &Version) -> Vec<String> {
    let version = version.to_string();
    command
        .iter()
        .map(|arg| arg.replace(VERSION_PLACEHOLDER, &version))
        .collect()
}

/// Builds a versioned plugin package
#[derive(Debug, Clone)]
pub struct PluginBuilder {
    runner: CommandRunner,
    command: Vec<String>,
    version_files: Vec<PathBuf>,
    artifact_dir: PathBuf,
    coordinates: ReleaseCoordinates,
}

impl PluginBuilder {
    /// `command` is an argv; paths are relative to `project_root`
    pub fn new(
        project_root: impl Into<PathBuf>,
        command: Vec<String>,
        version_files: Vec<PathBuf>,
        artifact_dir: impl AsRef<Path>,
        coordinates: ReleaseCoordinates,
    ) -> Result<Self, DeployError> {
        let project_root = project_root.into();
        let program = command
            .first()
            .ok_or_else(|| DeployError::Config("build command is empty".to_string()))?;

        let runner = CommandRunner::with_allowlist(&project_root, [program.as_str()]);

        Ok(Self {
            version_files: version_files
                .into_iter()
                .map(|f| project_root.join(f))
                .collect(),
            artifact_dir: project_root.join(artifact_dir),
            runner,
            command,
            coordinates,
        })
    }

    pub fn artifact_path(&self, version: &Version) -> PathBuf {
        self.artifact_dir.join(self.coordinates.asset_name(version))
    }

    /// Stamp, clean, build and checksum
    pub async fn build(&self, version: &Version) -> Result<Artifact, DeployError> {
        info!(version = %version, "Building plugin");

        for file in &self.version_files {
            self.stamp_file(file, version).await?;
        }
        self.remove_stale_packages().await?;

        let argv = expand_command(&self.command, version);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| DeployError::Config("build command is empty".to_string()))?;
        let output = self.runner.run(program, args).await?;
        if !output.success() {
            return Err(DeployError::Build(format!(
                "`{}` exited with status {}\n{}\n{}",
                argv.join(" "),
                output.status,
                tail(&output.stdout, 10),
                tail(&output.stderr, 20)
            )));
        }

        let path = self.artifact_path(version);
        if !tokio::fs::try_exists(&path).await? {
            return Err(DeployError::Build(format!(
                "build finished but {} was not produced",
                path.display()
            )));
        }

        let checksum = checksum_file(&path).await?;
        info!(path = %path.display(), checksum = %checksum, "Build complete");

        Ok(Artifact {
            path,
            version: *version,
            checksum,
        })
    }

    async fn stamp_file(&self, path: &Path, version: &Version) -> Result<(), DeployError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            DeployError::Build(format!("cannot read {}: {}", path.display(), e))
        })?;
        let stamped = stamp_version(&contents, version)?;
        if stamped != contents {
            tokio::fs::write(path, stamped).await?;
            debug!(file = %path.display(), "Version stamped");
        }
        Ok(())
    }

    async fn remove_stale_packages(&self) -> Result<(), DeployError> {
        if !tokio::fs::try_exists(&self.artifact_dir).await? {
            return Ok(());
        }

        let prefix = self.coordinates.asset_prefix();
        let mut entries = tokio::fs::read_dir(&self.artifact_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && name.ends_with(".zip") {
                tokio::fs::remove_file(entry.path()).await?;
                debug!(file = %name, "Removed stale package");
            }
        }
        Ok(())
    }
}
