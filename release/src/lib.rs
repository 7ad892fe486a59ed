//! Jellyship release bookkeeping
//!
//! Everything about a release that can be decided without talking to the
//! network: which version comes next, what the artifact is called and where
//! it will be downloaded from, its content checksum, and how the repository
//! manifest records it.

pub mod resolver;
pub mod store;
pub mod verifier;

use sdk::types::Version;
use std::path::PathBuf;

pub use resolver::next_version;
pub use store::{EntryMetadata, ManifestStore, UpsertOutcome};

/// A packaged build output bound to the version it was built for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Path of the packaged zip
    pub path: PathBuf,
    pub version: Version,
    /// MD5 of the zip bytes, lowercase hex
    pub checksum: String,
}

/// Naming rules for release tags, asset files and download URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseCoordinates {
    /// Asset file prefix, e.g. `tunnelfin`
    pub product: String,
    /// Base of release download URLs, e.g.
    /// `https://github.com/owner/repo/releases/download`
    pub download_base: String,
}

impl ReleaseCoordinates {
    pub fn new(product: impl Into<String>, download_base: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            download_base: download_base.into(),
        }
    }

    /// `<product>_<version>.zip`
    pub fn asset_name(&self, version: &Version) -> String {
        format!("{}_{}.zip", self.product, version)
    }

    /// Glob-style prefix shared by every asset of this product
    pub fn asset_prefix(&self) -> String {
        format!("{}_", self.product)
    }

    /// `<download_base>/v<version>/<asset>`
    pub fn asset_url(&self, version: &Version) -> String {
        format!(
            "{}/{}/{}",
            self.download_base.trim_end_matches('/'),
            version.tag(),
            self.asset_name(version)
        )
    }
}
