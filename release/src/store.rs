//! Release manifest store
//!
//! Reads and writes the repository manifest file and records releases in it.
//! Recording is idempotent per version: re-running a deploy for the same
//! version refreshes that entry's checksum and timestamp in place, while a
//! version not seen before is prepended. Entries are never re-sorted, so the
//! head of the list is only the newest release if releases are recorded in
//! version order.

use chrono::{DateTime, Utc};
use sdk::errors::DeployError;
use sdk::manifest::{ManifestChannel, ManifestFile, VersionEntry};
use sdk::types::Version;
use std::path::{Path, PathBuf};
use tracing::info;

/// Timestamp format used in manifest entries
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Descriptive fields for a newly inserted entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    pub changelog: String,
    pub target_abi: String,
    pub source_url: String,
}

/// What [`ManifestStore::upsert`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new entry was prepended
    Inserted,
    /// An existing entry had its checksum and timestamp refreshed
    Updated,
}

/// Manifest file on disk
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and strictly parse the manifest
    pub async fn load(&self) -> Result<ManifestFile, DeployError> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            DeployError::Manifest(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        ManifestFile::from_json(&contents)
    }

    /// Load the manifest if the file exists
    pub async fn load_existing(&self) -> Result<Option<ManifestFile>, DeployError> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(None);
        }
        self.load().await.map(Some)
    }

    pub async fn save(&self, manifest: &ManifestFile) -> Result<(), DeployError> {
        let json = manifest.to_json()?;
        tokio::fs::write(&self.path, json).await.map_err(|e| {
            DeployError::Manifest(format!("failed to write {}: {}", self.path.display(), e))
        })
    }

    /// Insert or refresh the entry for `version` in `channel`
    pub fn upsert(
        channel: &mut ManifestChannel,
        version: &Version,
        checksum: &str,
        metadata: &EntryMetadata,
        timestamp: DateTime<Utc>,
    ) -> UpsertOutcome {
        let stamp = timestamp.format(TIMESTAMP_FORMAT).to_string();

        if let Some(entry) = channel.find_mut(version) {
            entry.checksum = checksum.to_string();
            entry.timestamp = stamp;
            return UpsertOutcome::Updated;
        }

        channel.versions.insert(
            0,
            VersionEntry {
                version: version.to_string(),
                changelog: metadata.changelog.clone(),
                target_abi: metadata.target_abi.clone(),
                source_url: metadata.source_url.clone(),
                checksum: checksum.to_string(),
                timestamp: stamp,
            },
        );
        UpsertOutcome::Inserted
    }

    /// Load, upsert and save in one step
    pub async fn record_release(
        &self,
        version: &Version,
        checksum: &str,
        metadata: &EntryMetadata,
        timestamp: DateTime<Utc>,
    ) -> Result<UpsertOutcome, DeployError> {
        let mut manifest = self.load().await?;
        let outcome = Self::upsert(&mut manifest.channel, version, checksum, metadata, timestamp);
        self.save(&manifest).await?;

        info!(
            version = %version,
            checksum = %checksum,
            outcome = ?outcome,
            path = %self.path.display(),
            "Manifest updated"
        );
        Ok(outcome)
    }
}
