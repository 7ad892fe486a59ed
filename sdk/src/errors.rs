//! Error types and handling
//!
//! This module provides the error type shared by the release tooling and the
//! deployment engine. Every error implements [`DeployErrorExt`], which gives a
//! user-facing hint and says whether a later run can be expected to succeed
//! without someone changing configuration or the environment first.
//!
//! # Security
//!
//! Hints are static strings. They never echo credentials, tokens or the raw
//! response bodies returned by the host.

use thiserror::Error;

/// Extension trait for deployment errors
pub trait DeployErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors are usually transient (network, remote host still
    /// restarting). Non-recoverable errors abort the run and need a fix
    /// before the next attempt.
    fn is_recoverable(&self) -> bool;
}

/// Main error type for a release-and-deploy run
///
/// # Error Categories
///
/// - **Configuration**: invalid config file, missing credentials, missing tools
/// - **Manifest**: unreadable or wrongly shaped release manifest
/// - **Host**: authentication and transport failures against the host API
/// - **Toolchain**: build, publish and external command failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{DeployError, DeployErrorExt};
///
/// let error = DeployError::Network("connection reset".into());
/// assert!(error.is_recoverable());
///
/// let fatal = DeployError::MissingCredentials(vec!["JELLYFIN_PASSWORD".into()]);
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum DeployError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credentials: {}", .0.join(", "))]
    MissingCredentials(Vec<String>),

    #[error("Required tool not found: {0}")]
    MissingTool(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    // Manifest errors
    #[error("Malformed manifest: {0}")]
    ManifestShape(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    // Host errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Host error: {0}")]
    Host(String),

    // Toolchain errors
    #[error("Build failed: {0}")]
    Build(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Command `{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeployErrorExt for DeployError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your jellyship.toml file for errors",
            Self::MissingCredentials(_) => {
                "Set JELLYFIN_URL, JELLYFIN_USERNAME and JELLYFIN_PASSWORD in .env or the environment"
            }
            Self::MissingTool(_) => "Install the missing tool and make sure it is on PATH",
            Self::InvalidVersion(_) => "Versions look like v1.2.3 or 1.2.3.4",

            Self::ManifestShape(_) => {
                "manifest.json must be an array holding exactly one channel with a versions list"
            }
            Self::Manifest(_) => "Could not read or write manifest.json",
            Self::ChecksumMismatch { .. } => "Artifact changed after it was checksummed. Rebuild",

            Self::Authentication(_) => "Check the host username and password",
            Self::Network(_) => "Network operation failed. Check that the host is reachable",
            Self::Host(_) => "The host rejected the request. Check the host logs",

            Self::Build(_) => "The build command failed. Run it by hand to see the full output",
            Self::Publish(_) => "Publishing the release failed. Check `gh auth status`",
            Self::CommandFailed { .. } => "An external command failed. See the log for details",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_)
            | Self::MissingCredentials(_)
            | Self::MissingTool(_)
            | Self::InvalidVersion(_)
            | Self::ManifestShape(_)
            | Self::ChecksumMismatch { .. }
            | Self::Authentication(_) => false,

            _ => true,
        }
    }
}
