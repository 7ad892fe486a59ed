//! Versions and host-side records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::DeployError;

/// Release version: four non-negative components compared left to right
///
/// Parsed from `vMAJOR.MINOR.PATCH[.BUILD]`. The leading `v` is optional and
/// missing trailing components default to zero, so `v1.2` and `1.2.0.0`
/// denote the same version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub build: u64,
}

/// Reasons a version string is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("empty version string")]
    Empty,

    #[error("'{0}' has more than four components")]
    TooManyComponents(String),

    #[error("'{input}' has a non-numeric component '{component}'")]
    InvalidComponent { input: String, component: String },
}

impl From<VersionParseError> for DeployError {
    fn from(err: VersionParseError) -> Self {
        DeployError::InvalidVersion(err.to_string())
    }
}

impl Version {
    /// Version used when no release has ever been observed
    pub const INITIAL: Version = Version::new(1, 0, 0, 0);

    pub const fn new(major: u64, minor: u64, patch: u64, build: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            build,
        }
    }

    /// Same version with the build component incremented
    ///
    /// Fails when the build component is already at its maximum, since no
    /// later version with the same major, minor and patch exists.
    pub fn next_build(self) -> Result<Self, DeployError> {
        let build = self.build.checked_add(1).ok_or_else(|| {
            DeployError::InvalidVersion(format!("build component of {} cannot grow", self))
        })?;
        Ok(Self { build, ..self })
    }

    /// Release tag for this version (`v1.2.3.4`)
    pub fn tag(&self) -> String {
        format!("v{}", self)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.build
        )
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if body.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let parts: Vec<&str> = body.split('.').collect();
        if parts.len() > 4 {
            return Err(VersionParseError::TooManyComponents(s.to_string()));
        }

        let mut components = [0u64; 4];
        for (slot, part) in components.iter_mut().zip(&parts) {
            let invalid = || VersionParseError::InvalidComponent {
                input: s.to_string(),
                component: part.to_string(),
            };
            // u64::from_str accepts a leading '+', which no tag should carry
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = part.parse().map_err(|_| invalid())?;
        }

        let [major, minor, patch, build] = components;
        Ok(Version::new(major, minor, patch, build))
    }
}

/// Lifecycle status the host reports for an installed plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PluginStatus {
    Active,
    Restart,
    Deleted,
    Disabled,
    Superceded,
    Malfunctioned,
    NotSupported,
    Other(String),
}

impl PluginStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PluginStatus::Active => "Active",
            PluginStatus::Restart => "Restart",
            PluginStatus::Deleted => "Deleted",
            PluginStatus::Disabled => "Disabled",
            PluginStatus::Superceded => "Superceded",
            PluginStatus::Malfunctioned => "Malfunctioned",
            PluginStatus::NotSupported => "NotSupported",
            PluginStatus::Other(other) => other,
        }
    }
}

impl From<String> for PluginStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Active" => PluginStatus::Active,
            "Restart" => PluginStatus::Restart,
            "Deleted" => PluginStatus::Deleted,
            "Disabled" => PluginStatus::Disabled,
            "Superceded" => PluginStatus::Superceded,
            "Malfunctioned" => PluginStatus::Malfunctioned,
            "NotSupported" => PluginStatus::NotSupported,
            _ => PluginStatus::Other(value),
        }
    }
}

impl From<PluginStatus> for String {
    fn from(status: PluginStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Installed plugin as listed by the host. Read-only: only ever polled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstalledPlugin {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub status: PluginStatus,
}

/// Host-side pointer to a repository manifest
///
/// Unknown fields are carried through untouched because the host only
/// offers a replace-the-whole-list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RepositoryRegistration {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RepositoryRegistration {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
            extra: serde_json::Map::new(),
        }
    }
}
