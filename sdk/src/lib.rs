//! Jellyship SDK
//!
//! Shared vocabulary for the release tooling and the deployment engine:
//! release versions, the plugin repository manifest schema, the records the
//! host's management API hands back, and the common error type.

/// Error types and handling
pub mod errors;

/// Versions and host-side records
pub mod types;

/// Plugin repository manifest schema
pub mod manifest;

// Re-export commonly used types
pub use errors::{DeployError, DeployErrorExt};
pub use manifest::{ManifestChannel, ManifestFile, VersionEntry};
pub use types::{
    InstalledPlugin, PluginStatus, RepositoryRegistration, Version, VersionParseError,
};
