//! CDN propagation check
//!
//! After a release is published, the manifest and the asset reach the host
//! through a caching layer. Installing before the cache has caught up would
//! make the host fetch a stale manifest or a missing zip, so the deploy first
//! waits for both to be externally visible.
//!
//! The check runs in two phases sharing one budget: the manifest must show
//! the expected checksum within 60% of the timeout, then the asset must
//! answer a HEAD with 200 before the full timeout. A failed check is a
//! warning for the caller, never an abort.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use sdk::errors::DeployError;
use sdk::manifest::{ManifestChannel, ManifestFile};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::poller::{Poller, MAX_WAIT};

/// Host serving manifests from repository branches
pub const CDN_HOST: &str = "cdn.jsdelivr.net";
/// Host accepting cache purge requests for the same paths
pub const PURGE_HOST: &str = "purge.jsdelivr.net";

/// Share of the budget the manifest phase may use, in percent
const MANIFEST_BUDGET_PERCENT: u32 = 60;

/// Per-request timeout for probe requests
const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Derive the purge endpoint for a CDN URL, if it is served by the CDN
pub fn purge_url_for(manifest_url: &str) -> Option<String> {
    if manifest_url.contains(CDN_HOST) {
        Some(manifest_url.replacen(CDN_HOST, PURGE_HOST, 1))
    } else {
        None
    }
}

/// What must become visible
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationTarget {
    pub manifest_url: String,
    pub asset_url: String,
    pub expected_checksum: String,
}

/// Result of a propagation check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationOutcome {
    /// Manifest and asset are both visible
    Visible { elapsed: Duration },
    /// The manifest never showed the expected checksum; the asset was not probed
    ManifestStale { elapsed: Duration },
    /// The manifest was current but the asset never answered 200
    AssetMissing { elapsed: Duration },
}

impl PropagationOutcome {
    pub fn is_visible(&self) -> bool {
        matches!(self, PropagationOutcome::Visible { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            PropagationOutcome::Visible { elapsed }
            | PropagationOutcome::ManifestStale { elapsed }
            | PropagationOutcome::AssetMissing { elapsed } => *elapsed,
        }
    }
}

/// Network requests the propagation check is made of
#[async_trait]
pub trait ReleaseProbe: Send + Sync {
    /// Fire a cache purge; callers ignore the result
    async fn purge(&self, purge_url: &str) -> Result<(), DeployError>;

    /// Fetch and strictly parse the published manifest, bypassing caches
    async fn fetch_manifest(&self, manifest_url: &str) -> Result<ManifestChannel, DeployError>;

    /// HEAD the asset, following redirects, and return the final status
    async fn head_asset(&self, asset_url: &str) -> Result<u16, DeployError>;
}

/// [`ReleaseProbe`] over plain HTTP
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self, DeployError> {
        let client = Client::builder()
            .user_agent(format!("jellyship/{}", env!("CARGO_PKG_VERSION")))
            .timeout(PROBE_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DeployError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ReleaseProbe for HttpProbe {
    async fn purge(&self, purge_url: &str) -> Result<(), DeployError> {
        let response = self
            .client
            .get(purge_url)
            .send()
            .await
            .map_err(|e| DeployError::Network(e.to_string()))?;
        debug!(status = response.status().as_u16(), "Cache purge requested");
        Ok(())
    }

    async fn fetch_manifest(&self, manifest_url: &str) -> Result<ManifestChannel, DeployError> {
        let response = self
            .client
            .get(manifest_url)
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|e| DeployError::Network(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(DeployError::Network(format!(
                "manifest fetch returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DeployError::Network(e.to_string()))?;
        Ok(ManifestFile::from_json(&body)?.channel)
    }

    async fn head_asset(&self, asset_url: &str) -> Result<u16, DeployError> {
        let response = self
            .client
            .head(asset_url)
            .send()
            .await
            .map_err(|e| DeployError::Network(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// Two-phase propagation check built on [`Poller`]
#[derive(Debug, Clone)]
pub struct CdnVerifier<P> {
    probe: P,
    poller: Poller,
}

impl<P: ReleaseProbe> CdnVerifier<P> {
    pub fn new(probe: P, poller: Poller) -> Self {
        Self { probe, poller }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Wait until the release described by `target` is visible
    pub async fn verify(
        &self,
        target: &PropagationTarget,
        timeout: Duration,
    ) -> PropagationOutcome {
        let timeout = timeout.min(MAX_WAIT);
        let start = Instant::now();
        let manifest_deadline = start + timeout * MANIFEST_BUDGET_PERCENT / 100;
        let asset_deadline = start + timeout;

        if let Some(purge_url) = purge_url_for(&target.manifest_url) {
            if let Err(e) = self.probe.purge(&purge_url).await {
                debug!(error = %e, "Cache purge failed, ignoring");
            }
        }

        info!(
            url = %target.manifest_url,
            checksum = %target.expected_checksum,
            "Waiting for manifest to propagate"
        );
        let manifest = self
            .poller
            .poll_until(
                manifest_deadline,
                || self.probe.fetch_manifest(&target.manifest_url),
                |channel| {
                    channel
                        .latest()
                        .is_some_and(|entry| entry.checksum == target.expected_checksum)
                },
            )
            .await;

        if !manifest.is_ready() {
            warn!(
                attempts = manifest.attempts(),
                elapsed_secs = start.elapsed().as_secs(),
                "Manifest did not show the new checksum in time"
            );
            return PropagationOutcome::ManifestStale {
                elapsed: start.elapsed(),
            };
        }
        info!(elapsed_secs = start.elapsed().as_secs(), "Manifest is current");

        let asset = self
            .poller
            .poll_until(
                asset_deadline,
                || self.probe.head_asset(&target.asset_url),
                |status| *status == StatusCode::OK.as_u16(),
            )
            .await;

        let elapsed = start.elapsed();
        if asset.is_ready() {
            info!(elapsed_secs = elapsed.as_secs(), "Release asset is reachable");
            PropagationOutcome::Visible { elapsed }
        } else {
            warn!(
                url = %target.asset_url,
                attempts = asset.attempts(),
                "Release asset not reachable in time"
            );
            PropagationOutcome::AssetMissing { elapsed }
        }
    }
}
