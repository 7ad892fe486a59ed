//! Release and deployment sequencing
//!
//! [`DeploymentOrchestrator`] composes the manifest store, the publisher, the
//! CDN check and the host client into the two deploy modes:
//!
//! - [`release`](DeploymentOrchestrator::release): record the artifact in the
//!   manifest, publish it, push the manifest, wait for the CDN, then run the
//!   two-phase deploy and verify the result.
//! - [`deploy_from_repository`](DeploymentOrchestrator::deploy_from_repository):
//!   point the host at an already published manifest and trigger the
//!   install without waiting for it.
//!
//! Only configuration mistakes, authentication and the bookkeeping steps the
//! later steps depend on abort a run. Everything the host does after a
//! trigger is established by polling, and a poll running out is recorded in
//! the report as a timeout before the run moves on.

pub mod report;

use chrono::Utc;
use jellyship_release::verifier::verify_file;
use jellyship_release::{Artifact, EntryMetadata, ManifestStore, ReleaseCoordinates};
use sdk::errors::DeployError;
use sdk::types::Version;
use std::time::Duration;
use tracing::{info, warn};

use crate::cdn::{CdnVerifier, PropagationTarget, ReleaseProbe};
use crate::host::{ExpectedState, PluginHost, PluginSelector, TriggerAck};
use crate::toolchain::ReleasePublisher;

pub use report::{DeployReport, Phase, PhaseOutcome, PhaseRecord, Verification};

/// Budgets for each convergence wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployTimeouts {
    pub cdn: Duration,
    pub healthy: Duration,
    pub removed: Duration,
    pub verify: Duration,
}

impl Default for DeployTimeouts {
    fn default() -> Self {
        Self {
            cdn: Duration::from_secs(120),
            healthy: Duration::from_secs(90),
            removed: Duration::from_secs(30),
            verify: Duration::from_secs(60),
        }
    }
}

/// The plugin being released and where the host finds it
#[derive(Debug, Clone)]
pub struct ReleaseTarget {
    pub plugin: PluginSelector,
    /// Package name the host installs by
    pub package: String,
    pub repository_name: String,
    /// Manifest URL the host is pointed at and the CDN check reads
    pub manifest_url: String,
    pub coordinates: ReleaseCoordinates,
    pub target_abi: String,
    /// Changelog for new entries; `{version}` is substituted
    pub changelog: String,
}

impl ReleaseTarget {
    pub fn entry_metadata(&self, version: &Version) -> EntryMetadata {
        EntryMetadata {
            changelog: self.changelog.replace("{version}", &version.to_string()),
            target_abi: self.target_abi.clone(),
            source_url: self.coordinates.asset_url(version),
        }
    }

    pub fn propagation_target(&self, artifact: &Artifact) -> PropagationTarget {
        PropagationTarget {
            manifest_url: self.manifest_url.clone(),
            asset_url: self.coordinates.asset_url(&artifact.version),
            expected_checksum: artifact.checksum.clone(),
        }
    }
}

/// Drives one deployment run
pub struct DeploymentOrchestrator<H, P, R> {
    host: H,
    publisher: P,
    verifier: CdnVerifier<R>,
    store: ManifestStore,
    target: ReleaseTarget,
    timeouts: DeployTimeouts,
}

impl<H, P, R> DeploymentOrchestrator<H, P, R>
where
    H: PluginHost,
    P: ReleasePublisher,
    R: ReleaseProbe,
{
    pub fn new(
        host: H,
        publisher: P,
        verifier: CdnVerifier<R>,
        store: ManifestStore,
        target: ReleaseTarget,
    ) -> Self {
        Self {
            host,
            publisher,
            verifier,
            store,
            target,
            timeouts: DeployTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: DeployTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Checks that must pass before anything is built or published
    pub async fn preflight(&self) -> Result<(), DeployError> {
        self.publisher.ensure_ready().await
    }

    /// Full release: manifest, publish, CDN, two-phase deploy, verification
    pub async fn release(&mut self, artifact: &Artifact) -> Result<DeployReport, DeployError> {
        let version = artifact.version;
        let mut report = DeployReport::new(version.to_string(), Some(artifact.checksum.clone()));
        info!(version = %version, checksum = %artifact.checksum, "Starting release");

        // The bytes published must be the bytes the manifest describes
        verify_file(&artifact.path, &artifact.checksum).await?;

        let upsert = self
            .store
            .record_release(
                &version,
                &artifact.checksum,
                &self.target.entry_metadata(&version),
                Utc::now(),
            )
            .await?;
        report.record(
            Phase::ManifestUpdate,
            PhaseOutcome::Success,
            Some(format!("{:?}", upsert).to_lowercase()),
        );

        let action = self.publisher.publish_asset(&version, &artifact.path).await?;
        report.record(
            Phase::Publish,
            PhaseOutcome::Success,
            Some(format!("{:?}", action).to_lowercase()),
        );

        self.publisher
            .push_manifest(self.store.path(), &version, &artifact.checksum)
            .await?;
        report.record(Phase::ManifestPush, PhaseOutcome::Success, None);

        let propagation = self
            .verifier
            .verify(&self.target.propagation_target(artifact), self.timeouts.cdn)
            .await;
        if propagation.is_visible() {
            report.record(
                Phase::CdnPropagation,
                PhaseOutcome::Success,
                Some(format!("{}s", propagation.elapsed().as_secs())),
            );
        } else {
            warn!(
                outcome = ?propagation,
                "CDN not ready, the host install will likely fail. Continuing anyway"
            );
            report.record(
                Phase::CdnPropagation,
                PhaseOutcome::Timeout,
                Some(format!("{:?}", propagation)),
            );
        }

        let manifest_url = self.target.manifest_url.clone();
        self.connect(&manifest_url, &mut report).await?;
        self.teardown(&mut report).await?;
        self.install(&manifest_url, &version, &mut report).await;
        self.verify(&version, &mut report).await;

        Ok(report)
    }

    /// Point the host at a published manifest and trigger the install
    ///
    /// Any existing installation is uninstalled first. Nothing is polled;
    /// the host finishes installing after the restart.
    pub async fn deploy_from_repository(
        &mut self,
        version: &Version,
        repository_url: &str,
    ) -> Result<DeployReport, DeployError> {
        let mut report = DeployReport::new(version.to_string(), None);
        info!(version = %version, url = %repository_url, "Deploying from repository");

        self.connect(repository_url, &mut report).await?;

        if let Some(plugin_id) = self.host.find_plugin_id(&self.target.plugin).await? {
            let ack = self.host.uninstall(&plugin_id).await;
            record_trigger(&mut report, Phase::Uninstall, ack);
        } else {
                report.record(
                Phase::Uninstall,
                PhaseOutcome::Skipped,
                Some("not installed".into()),
            );
        }

        let ack = self
            .host
            .install(&self.target.package, repository_url, version)
            .await;
        record_trigger(&mut report, Phase::Install, ack);

        let ack = self.host.restart().await;
        record_trigger(&mut report, Phase::RestartAfterInstall, ack);

        Ok(report)
    }

    /// Authenticate and make sure the host knows the repository
    async fn connect(
        &mut self,
        manifest_url: &str,
        report: &mut DeployReport,
    ) -> Result<(), DeployError> {
        self.host.authenticate().await?;
        let change = self
            .host
            .ensure_repository(&self.target.repository_name, manifest_url)
            .await?;
        report.record(
            Phase::Repository,
            PhaseOutcome::Success,
            Some(format!("{:?}", change).to_lowercase()),
        );
        Ok(())
    }

    /// Remove an existing installation and wait for the host to forget it
    async fn teardown(&mut self, report: &mut DeployReport) -> Result<(), DeployError> {
        let Some(existing) = self.host.find_plugin(&self.target.plugin).await? else {
            info!(plugin = %self.target.plugin.name, "No existing installation");
            report.record(Phase::Uninstall, PhaseOutcome::Skipped, Some("not installed".into()));
            return Ok(());
        };

        info!(
            plugin_id = %existing.id,
            version = %existing.version,
            "Removing existing installation"
        );
        let ack = self.host.uninstall(&existing.id).await;
        record_trigger(report, Phase::Uninstall, ack);

        let ack = self.host.restart().await;
        record_trigger(report, Phase::RestartAfterUninstall, ack);

        let healthy = self.host.wait_for_healthy(self.timeouts.healthy).await;
        report.record_wait(Phase::HealthAfterUninstall, &healthy);
        if !healthy.is_ready() {
            warn!("Host did not come back after uninstall, continuing anyway");
            report.record(Phase::Removal, PhaseOutcome::Skipped, Some("host not healthy".into()));
            return Ok(());
        }

        self.host.reauthenticate().await;
        let removed = self
            .host
            .wait_for_plugin_state(
                &self.target.plugin,
                &ExpectedState::Removed,
                self.timeouts.removed,
            )
            .await;
        report.record_wait(Phase::Removal, &removed);
        Ok(())
    }

    async fn install(&mut self, manifest_url: &str, version: &Version, report: &mut DeployReport) {
        let ack = self
            .host
            .install(&self.target.package, manifest_url, version)
            .await;
        record_trigger(report, Phase::Install, ack);

        let ack = self.host.restart().await;
        record_trigger(report, Phase::RestartAfterInstall, ack);

        let healthy = self.host.wait_for_healthy(self.timeouts.healthy).await;
        report.record_wait(Phase::HealthAfterInstall, &healthy);
        if healthy.is_ready() {
            self.host.reauthenticate().await;
        } else {
            warn!("Host did not come back after install, continuing anyway");
        }
    }

    async fn verify(&self, version: &Version, report: &mut DeployReport) {
        let outcome = self
            .host
            .wait_for_plugin_version(&self.target.plugin, version, self.timeouts.verify)
            .await;

        report.verification = match outcome.into_value() {
            Some(plugin) => {
                info!(version = %plugin.version, "Plugin is active");
                Verification::Verified { plugin }
            }
            None => {
                let observed = match self.host.find_plugin(&self.target.plugin).await {
                    Ok(observed) => observed,
                    Err(e) => {
                        warn!(error = %e, "Final plugin read failed");
                        None
                    }
                };
                match &observed {
                    Some(plugin) => warn!(
                        version = %plugin.version,
                        status = %plugin.status,
                        "Verification inconclusive"
                    ),
                    None => warn!("Verification inconclusive, plugin not found after install"),
                }
                Verification::Inconclusive { observed }
            }
        };
    }
}

fn record_trigger(
    report: &mut DeployReport,
    phase: Phase,
    ack: Result<TriggerAck, crate::host::HostError>,
) {
    match ack {
        Ok(TriggerAck::Accepted(status)) => {
            report.record(phase, PhaseOutcome::Success, Some(format!("HTTP {}", status)))
        }
        Ok(TriggerAck::ConnectionDropped) => report.record(
            phase,
            PhaseOutcome::Success,
            Some("connection dropped".to_string()),
        ),
        Ok(TriggerAck::Rejected(status)) => {
            report.record(phase, PhaseOutcome::Failed, Some(format!("HTTP {}", status)))
        }
        Err(e) => {
            warn!(phase = %phase, error = %e, "Trigger failed, relying on polling");
            report.record(phase, PhaseOutcome::Failed, Some(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests;
