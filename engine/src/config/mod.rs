//! Configuration management
//!
//! Jellyship reads one TOML file, looked up in this order:
//!
//! 1. the path given with `--config`
//! 2. `./jellyship.toml`
//! 3. `~/.jellyship/config.toml`
//!
//! A missing file means defaults. Every section is optional.
//!
//! # Configuration Sections
//!
//! - **core**: log level, project root
//! - **project**: plugin identity and manifest location
//! - **build**: build command, version files, artifact directory
//! - **release**: GitHub repository and the URLs derived from it
//! - **host**: media server URL, user and client identity
//! - **timeouts**: poll interval and convergence budgets
//!
//! # Credentials
//!
//! The host password never lives in the file. `JELLYFIN_URL`,
//! `JELLYFIN_USERNAME` and `JELLYFIN_PASSWORD` are read from the process
//! environment once, during [`Config::load`], after `.env` in the project
//! root has been loaded into it.
//!
//! # Examples
//!
//! ```no_run
//! use jellyship_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(None)?;
//! println!("Plugin: {}", config.project.plugin_name);
//! # Ok(())
//! # }
//! ```

use sdk::errors::DeployError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::host::{ClientIdentity, HostSettings};
use crate::orchestrator::DeployTimeouts;
use crate::toolchain::build::VERSION_PLACEHOLDER;

/// File name looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "jellyship.toml";

/// Credentials file looked up in the project root
pub const ENV_FILE: &str = ".env";

/// Upper bound for every configured timeout, one day
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

pub const ENV_HOST_URL: &str = "JELLYFIN_URL";
pub const ENV_HOST_USERNAME: &str = "JELLYFIN_USERNAME";
pub const ENV_HOST_PASSWORD: &str = "JELLYFIN_PASSWORD";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub release: ReleaseConfig,

    #[serde(default)]
    pub host: HostConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Checkout the build, git and gh commands run in (supports ~ expansion)
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
}

/// The plugin being shipped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Display and package name on the host
    #[serde(default = "default_plugin_name")]
    pub plugin_name: String,

    /// Asset file prefix: `<product>_<version>.zip`
    #[serde(default = "default_product")]
    pub product: String,

    /// Plugin GUID; matched before the name when set
    #[serde(default)]
    pub plugin_guid: Option<String>,

    #[serde(default = "default_target_abi")]
    pub target_abi: String,

    /// Manifest file, relative to the project root
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,

    /// Changelog for new manifest entries; `{version}` is substituted
    #[serde(default = "default_changelog")]
    pub changelog: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build command argv; must mention `{version}`
    #[serde(default = "default_build_command")]
    pub command: Vec<String>,

    /// Directory the zip is produced in, relative to the project root
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Project files whose version elements are stamped before building
    #[serde(default)]
    pub version_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// GitHub owner of the plugin repository
    #[serde(default)]
    pub owner: String,

    /// GitHub repository name
    #[serde(default)]
    pub repo: String,

    /// Override for `https://github.com/<owner>/<repo>/releases/download`
    #[serde(default)]
    pub download_base: Option<String>,

    /// Override for the manifest URL a full release registers
    #[serde(default)]
    pub manifest_url: Option<String>,

    /// Override for the per-branch manifest URL; `{branch}` is substituted
    #[serde(default)]
    pub branch_manifest_url: Option<String>,

    /// Branch the manifest is published on
    #[serde(default = "default_publish_branch")]
    pub publish_branch: String,

    /// Repository name registered on the host; defaults to the plugin name
    #[serde(default)]
    pub repository_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Base URL, overridden by `JELLYFIN_URL`
    #[serde(default)]
    pub url: Option<String>,

    /// User name, overridden by `JELLYFIN_USERNAME`
    #[serde(default)]
    pub username: Option<String>,

    /// Only ever taken from `JELLYFIN_PASSWORD`
    #[serde(skip)]
    pub password: Option<String>,

    #[serde(default = "default_client")]
    pub client: String,

    #[serde(default = "default_device")]
    pub device: String,

    #[serde(default = "default_device_id")]
    pub device_id: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_restart_timeout")]
    pub restart_timeout_secs: u64,
}

/// Poll interval and convergence budgets, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_cdn_timeout")]
    pub cdn_secs: u64,

    #[serde(default = "default_healthy_timeout")]
    pub healthy_secs: u64,

    #[serde(default = "default_removed_timeout")]
    pub removed_secs: u64,

    #[serde(default = "default_verify_timeout")]
    pub verify_secs: u64,
}

/// Resolved host login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCredentials {
    pub url: String,
    pub username: String,
    pub password: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_plugin_name() -> String {
    "TunnelFin".to_string()
}

fn default_product() -> String {
    "tunnelfin".to_string()
}

fn default_target_abi() -> String {
    "10.11.0.0".to_string()
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("manifest.json")
}

fn default_changelog() -> String {
    "v{version} - Local build deployment".to_string()
}

fn default_build_command() -> Vec<String> {
    vec!["./scripts/package.sh".to_string(), VERSION_PLACEHOLDER.to_string()]
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_publish_branch() -> String {
    "main".to_string()
}

fn default_client() -> String {
    "Jellyship".to_string()
}

fn default_device() -> String {
    "Build Script".to_string()
}

fn default_device_id() -> String {
    "jellyship-build".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_restart_timeout() -> u64 {
    5
}

fn default_poll_interval() -> u64 {
    2
}

fn default_cdn_timeout() -> u64 {
    120
}

fn default_healthy_timeout() -> u64 {
    90
}

fn default_removed_timeout() -> u64 {
    30
}

fn default_verify_timeout() -> u64 {
    60
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            project_root: default_project_root(),
        }
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            plugin_name: default_plugin_name(),
            product: default_product(),
            plugin_guid: None,
            target_abi: default_target_abi(),
            manifest_path: default_manifest_path(),
            changelog: default_changelog(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: default_build_command(),
            artifact_dir: default_artifact_dir(),
            version_files: Vec::new(),
        }
    }
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            download_base: None,
            manifest_url: None,
            branch_manifest_url: None,
            publish_branch: default_publish_branch(),
            repository_name: None,
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            client: default_client(),
            device: default_device(),
            device_id: default_device_id(),
            request_timeout_secs: default_request_timeout(),
            restart_timeout_secs: default_restart_timeout(),
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            cdn_secs: default_cdn_timeout(),
            healthy_secs: default_healthy_timeout(),
            removed_secs: default_removed_timeout(),
            verify_secs: default_verify_timeout(),
        }
    }
}

impl ReleaseConfig {
    fn github_repo(&self) -> Result<(&str, &str), DeployError> {
        if self.owner.is_empty() || self.repo.is_empty() {
            return Err(DeployError::Config(
                "release.owner and release.repo must be set".to_string(),
            ));
        }
        Ok((&self.owner, &self.repo))
    }

    pub fn download_base(&self) -> Result<String, DeployError> {
        if let Some(base) = &self.download_base {
            return Ok(base.clone());
        }
        let (owner, repo) = self.github_repo()?;
        Ok(format!("https://github.com/{}/{}/releases/download", owner, repo))
    }

    /// Manifest URL for full releases, read without CDN caching
    pub fn manifest_url(&self) -> Result<String, DeployError> {
        if let Some(url) = &self.manifest_url {
            return Ok(url.clone());
        }
        let (owner, repo) = self.github_repo()?;
        Ok(format!(
            "https://raw.githubusercontent.com/{}/{}/{}/manifest.json",
            owner, repo, self.publish_branch
        ))
    }

    /// CDN manifest URL for a branch
    pub fn branch_manifest_url(&self, branch: &str) -> Result<String, DeployError> {
        if let Some(template) = &self.branch_manifest_url {
            return Ok(template.replace("{branch}", branch));
        }
        let (owner, repo) = self.github_repo()?;
        Ok(format!(
            "https://cdn.jsdelivr.net/gh/{}/{}@{}/manifest.json",
            owner, repo, branch
        ))
    }
}

impl Config {
    /// Load from `path`, or from the first default location that exists
    ///
    /// Host credentials are taken from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - An explicit `path` does not exist
    /// - The file cannot be read or parsed
    /// - Validation fails
    pub fn load(path: Option<&Path>) -> Result<Self, DeployError> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => match Self::default_config_paths().into_iter().find(|p| p.is_file()) {
                Some(found) => Self::read_file(&found)?,
                None => Self::default(),
            },
        };

        config.core.project_root = expand_path(&config.core.project_root)?;
        load_env_file(&config.core.project_root)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without touching the environment
    pub fn read_file(path: &Path) -> Result<Self, DeployError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            DeployError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, DeployError> {
        toml::from_str(contents)
            .map_err(|e| DeployError::Config(format!("Failed to parse config: {}", e)))
    }

    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".jellyship").join("config.toml"));
        }
        paths
    }

    /// Copy host settings from environment variables that are set
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup(ENV_HOST_URL) {
            self.host.url = Some(url);
        }
        if let Some(username) = lookup(ENV_HOST_USERNAME) {
            self.host.username = Some(username);
        }
        if let Some(password) = lookup(ENV_HOST_PASSWORD) {
            self.host.password = Some(password);
        }
    }

    /// Check values that would only fail later, mid-deployment
    pub fn validate(&self) -> Result<(), DeployError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(DeployError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.project.plugin_name.trim().is_empty() {
            return Err(DeployError::Config("project.plugin_name is empty".to_string()));
        }
        if self.project.product.trim().is_empty() {
            return Err(DeployError::Config("project.product is empty".to_string()));
        }

        if let Some(name) = &self.release.repository_name {
            if name.trim().is_empty() {
                return Err(DeployError::Config(
                    "release.repository_name must not be empty".to_string(),
                ));
            }
        }

        let bounded = [
            ("timeouts.poll_interval_secs", self.timeouts.poll_interval_secs),
            ("timeouts.cdn_secs", self.timeouts.cdn_secs),
            ("timeouts.healthy_secs", self.timeouts.healthy_secs),
            ("timeouts.removed_secs", self.timeouts.removed_secs),
            ("timeouts.verify_secs", self.timeouts.verify_secs),
            ("host.request_timeout_secs", self.host.request_timeout_secs),
            ("host.restart_timeout_secs", self.host.restart_timeout_secs),
        ];
        for (key, secs) in bounded {
            if secs > MAX_TIMEOUT_SECS {
                return Err(DeployError::Config(format!(
                    "{} is {}s, the maximum is {}s",
                    key, secs, MAX_TIMEOUT_SECS
                )));
            }
        }

        if self.timeouts.poll_interval_secs == 0 {
            return Err(DeployError::Config(
                "timeouts.poll_interval_secs must be at least 1".to_string(),
            ));
        }

        if !self
            .build
            .command
            .iter()
            .any(|arg| arg.contains(VERSION_PLACEHOLDER))
        {
            return Err(DeployError::Config(format!(
                "build.command must contain the {} placeholder",
                VERSION_PLACEHOLDER
            )));
        }

        Ok(())
    }

    /// Host login, or the names of the variables that are missing
    pub fn host_credentials(&self) -> Result<HostCredentials, DeployError> {
        let mut missing = Vec::new();
        if self.host.url.is_none() {
            missing.push(ENV_HOST_URL.to_string());
        }
        if self.host.username.is_none() {
            missing.push(ENV_HOST_USERNAME.to_string());
        }
        if self.host.password.is_none() {
            missing.push(ENV_HOST_PASSWORD.to_string());
        }

        match (&self.host.url, &self.host.username, &self.host.password) {
            (Some(url), Some(username), Some(password)) => Ok(HostCredentials {
                url: url.clone(),
                username: username.clone(),
                password: password.clone(),
            }),
            _ => Err(DeployError::MissingCredentials(missing)),
        }
    }

    pub fn host_settings(&self) -> Result<HostSettings, DeployError> {
        let credentials = self.host_credentials()?;
        Ok(HostSettings {
            base_url: credentials.url,
            username: credentials.username,
            password: credentials.password,
            identity: ClientIdentity {
                client: self.host.client.clone(),
                device: self.host.device.clone(),
                device_id: self.host.device_id.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            request_timeout: Duration::from_secs(self.host.request_timeout_secs),
            restart_timeout: Duration::from_secs(self.host.restart_timeout_secs),
            poll_interval: self.poll_interval(),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.timeouts.poll_interval_secs)
    }

    pub fn deploy_timeouts(&self) -> DeployTimeouts {
        DeployTimeouts {
            cdn: Duration::from_secs(self.timeouts.cdn_secs),
            healthy: Duration::from_secs(self.timeouts.healthy_secs),
            removed: Duration::from_secs(self.timeouts.removed_secs),
            verify: Duration::from_secs(self.timeouts.verify_secs),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.core.project_root.join(&self.project.manifest_path)
    }

    pub fn repository_name(&self) -> &str {
        self.release
            .repository_name
            .as_deref()
            .unwrap_or(&self.project.plugin_name)
    }
}

/// Load `<project_root>/.env` into the process environment
///
/// Variables that are already set keep their values. Returns whether a file
/// was found.
pub fn load_env_file(project_root: &Path) -> Result<bool, DeployError> {
    let path = project_root.join(ENV_FILE);
    if !path.is_file() {
        return Ok(false);
    }
    dotenvy::from_path(&path)
        .map_err(|e| DeployError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(true)
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, DeployError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| DeployError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| DeployError::Config("Could not determine home directory".to_string()))?;
        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| DeployError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
